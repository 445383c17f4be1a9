//! Workarounds for known archive server defects.
//!
//! Each shim lives here as a single named transformation so it can be
//! deleted cleanly once the server side is fixed, instead of being
//! inlined at every call site.

use url::Url;

use crate::error::Result;

/// The archive's cutout and SIA vohdu endpoints currently address HDUs
/// off by one. While this switch is on, every HDU index leaving the
/// client is shifted by one on the wire. Flip to `false` (and then
/// drop the shim) once the archive deploys the fix.
pub const HDU_INDEX_WORKAROUND: bool = true;

/// Map a caller-facing HDU index to the index the server expects.
pub fn wire_hdu_index(hduidx: u32) -> u32 {
    if HDU_INDEX_WORKAROUND { hduidx + 1 } else { hduidx }
}

/// Replace a vohdu record URL's query string with `hdus=0,{wire index}`.
/// The server-supplied query parameters are dropped, not merged.
pub fn rewrite_hdu_url(raw: &str, hdu_idx: u32) -> Result<String> {
    let mut url = Url::parse(raw)?;
    url.set_query(Some(&format!("hdus=0,{}", wire_hdu_index(hdu_idx))));
    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_index_shifted_by_one() {
        assert_eq!(wire_hdu_index(34), 35);
        assert_eq!(wire_hdu_index(0), 1);
    }

    #[test]
    fn test_rewrite_replaces_query_entirely() {
        let rewritten =
            rewrite_hdu_url("https://example.org/api/retrieve/abc?foo=bar", 34).unwrap();
        assert_eq!(rewritten, "https://example.org/api/retrieve/abc?hdus=0,35");
    }

    #[test]
    fn test_rewrite_rejects_garbage_url() {
        assert!(rewrite_hdu_url("not a url", 0).is_err());
    }
}
