//! The archive client.
//!
//! One [`Client`] per server. Construction performs the API version
//! handshake; after that every method is a single blocking HTTP call
//! that either returns a wrapped result or a typed error. Nothing is
//! retried, and no work happens in the background.
//!
//! A `Client` is not meant to be shared between threads: the header
//! cache is a plain unsynchronized map.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::blocking::{Client as HttpClient, Response};
use tracing::debug;
use url::Url;

use crate::compat;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::ext::{ExperimentalOps, HduBounds};
use crate::types::{FindOptions, Found, HduHeader, SearchSpec, VohduOptions};

/// Server API version this client was built against. Bump on server
/// version increment.
pub const KNOWN_GOOD_API_VERSION: f64 = 8.0;

/// Handle to one archive server.
pub struct Client {
    http: HttpClient,
    api_url: String,
    api_version: f64,
    verbose: bool,
    connect_timeout: Duration,
    read_timeout: Duration,
    headers: HashMap<String, Vec<HduHeader>>,
    ext: Option<Box<dyn ExperimentalOps>>,
}

impl Client {
    /// Connect to the archive and verify API compatibility.
    ///
    /// Fetches the server's API version once; a server whose major
    /// version is ahead of [`KNOWN_GOOD_API_VERSION`] is rejected
    /// before any query method becomes usable.
    pub fn connect(config: Config) -> Result<Self> {
        Self::connect_with(config, None)
    }

    /// Like [`Client::connect`], with an extended-operations
    /// implementation selected for the lifetime of the client.
    pub fn connect_with(config: Config, ext: Option<Box<dyn ExperimentalOps>>) -> Result<Self> {
        let (connect_timeout, read_timeout) = config.effective_timeouts();
        let http = HttpClient::builder()
            .connect_timeout(connect_timeout)
            .timeout(read_timeout)
            .build()?;
        let api_url = config.api_url();

        let endpoint = format!("{api_url}/version/");
        let res = http.get(&endpoint).send().map_err(|source| Error::Connection {
            url: endpoint.clone(),
            source,
        })?;
        let verstr = res.text().map_err(|source| Error::Connection {
            url: endpoint,
            source,
        })?;
        let api_version: f64 = verstr
            .trim()
            .parse()
            .map_err(|_| Error::BadResponse(format!("unparseable API version {verstr:?}")))?;

        if version_incompatible(api_version, KNOWN_GOOD_API_VERSION) {
            return Err(Error::IncompatibleVersion {
                url: api_url,
                server: api_version,
                expected: KNOWN_GOOD_API_VERSION,
            });
        }
        debug!(%api_url, api_version, "connected");

        Ok(Self {
            http,
            api_url,
            api_version,
            verbose: config.verbose,
            connect_timeout,
            read_timeout,
            headers: HashMap::new(),
            ext,
        })
    }

    /// API root this client talks to.
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// API version the server reported at construction.
    pub fn api_version(&self) -> f64 {
        self.api_version
    }

    /// API version this client build expects.
    pub fn expected_api_version(&self) -> f64 {
        KNOWN_GOOD_API_VERSION
    }

    /// Extended operations selected at construction, if any.
    pub fn experimental(&self) -> Option<&dyn ExperimentalOps> {
        self.ext.as_deref()
    }

    /// Find records in the archive database.
    ///
    /// Compiles the constraints into the server's search-term list and
    /// posts them to the advanced-search endpoint. The record type is
    /// inferred from the requested and constrained field names: any
    /// `hdu:`-prefixed field selects per-HDU records.
    pub fn find(&self, opts: &FindOptions) -> Result<Found> {
        let spec = SearchSpec::compile(opts.outfields.as_deref(), &opts.constraints);
        let mut url = Url::parse(&format!("{}/adv_search/find/", self.api_url))?;
        url.query_pairs_mut()
            .append_pair("limit", &opts.limit.to_string())
            .append_pair("rectype", spec.rectype().as_str());
        if let Some(sort) = &opts.sort {
            url.query_pairs_mut().append_pair("sort", sort);
        }
        debug!(%url, "adv_search/find");

        let res = self.http.post(url).json(&spec).send()?;
        let body = self.success(res)?.json()?;
        Found::from_json(body)
    }

    /// SIA query for HDUs overlapping a sky position.
    ///
    /// `pos` is `(ra, dec)` in degrees, `size` the search radius in
    /// degrees. Record URLs are rewritten to address the matching HDU
    /// (see [`crate::compat`] for the index shift involved).
    pub fn vohdu(&self, pos: (f64, f64), size: f64, opts: &VohduOptions) -> Result<Found> {
        let mut url = Url::parse(&format!("{}/sia/vohdu", self.api_url))?;
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in opts.query_pairs(pos, size) {
                query.append_pair(key, &value);
            }
        }
        debug!(%url, "sia/vohdu");

        let res = self.http.get(url).send()?;
        let body = self.success(res)?.json()?;
        let mut found = Found::from_json(body)?;

        for record in found.records_mut() {
            if !record.contains_key("url") {
                continue;
            }
            let Some(hdu_idx) = record.get("hdu_idx").and_then(value_as_u32) else {
                debug!("vohdu record has url but no hdu_idx; left unrewritten");
                continue;
            };
            if let Some(raw) = record.get("url").and_then(serde_json::Value::as_str) {
                let rewritten = compat::rewrite_hdu_url(raw, hdu_idx)?;
                record.insert("url".to_string(), rewritten.into());
            }
        }
        Ok(found)
    }

    /// Download one whole FITS file from the archive.
    ///
    /// Streams the response to `outfile`, or to `ADA_{md5}_{hdus}.fits`
    /// in the working directory when no path is given. Returns the
    /// path written.
    pub fn retrieve(
        &self,
        md5: &str,
        hdus: Option<&[u32]>,
        outfile: Option<&Path>,
    ) -> Result<PathBuf> {
        let url = format!("{}/retrieve/{}", self.api_url, md5);
        debug!(%url, "retrieve");

        let res = self.http.get(&url).send()?;
        let mut res = self.success(res)?;

        let path = match outfile {
            Some(path) => path.to_path_buf(),
            None => {
                let hdustr = match hdus {
                    Some(list) => list
                        .iter()
                        .map(u32::to_string)
                        .collect::<Vec<_>>()
                        .join("_"),
                    None => "x".to_string(),
                };
                PathBuf::from(format!("ADA_{md5}_{hdustr}.fits"))
            }
        };
        let mut file = File::create(&path)?;
        res.copy_to(&mut file)?;
        Ok(path)
    }

    /// Download a FITS cutout: a sub-image around `(ra, dec)` from one
    /// HDU of the named file.
    ///
    /// `size` is the cutout width in pixels, `hduidx` the zero-based
    /// HDU index as the caller sees it (the wire index differs, see
    /// [`crate::compat`]). Streams to `outfile` or to
    /// `subimage_{md5}_{ra}_{dec}.fits`. Returns the path written.
    pub fn cutout(
        &self,
        ra: f64,
        dec: f64,
        size: f64,
        md5: &str,
        hduidx: u32,
        outfile: Option<&Path>,
    ) -> Result<PathBuf> {
        let mut url = Url::parse(&format!("{}/cutout/{}", self.api_url, md5))?;
        url.query_pairs_mut()
            .append_pair("ra", &ra.to_string())
            .append_pair("dec", &dec.to_string())
            .append_pair("size", &size.to_string())
            .append_pair("hduidx", &compat::wire_hdu_index(hduidx).to_string());
        debug!(%url, "cutout");

        let res = self.http.get(url).send()?;
        let mut res = self.success(res)?;

        let path = match outfile {
            Some(path) => path.to_path_buf(),
            None => PathBuf::from(format!(
                "subimage_{}_{}_{}.fits",
                md5,
                ra.trunc() as i64,
                dec.trunc() as i64
            )),
        };
        let mut file = File::create(&path)?;
        res.copy_to(&mut file)?;
        Ok(path)
    }

    /// FITS headers of one stored file, one map per HDU.
    ///
    /// Headers are cached per client instance keyed by checksum; a
    /// cache hit issues no request.
    pub fn fits_header(&mut self, md5: &str) -> Result<Vec<HduHeader>> {
        if let Some(cached) = self.headers.get(md5) {
            debug!(md5, "header cache hit");
            return Ok(cached.clone());
        }

        let mut url = Url::parse(&format!("{}/header/{}", self.api_url, md5))?;
        url.query_pairs_mut().append_pair("format", "json");
        debug!(%url, "header");

        let res = self.http.get(url).send()?;
        let body: serde_json::Value = self.success(res)?.json()?;
        let list: Vec<HduHeader> = serde_json::from_value(body)
            .map_err(|e| Error::BadResponse(format!("malformed header list: {e}")))?;

        self.headers.insert(md5.to_string(), list.clone());
        Ok(list)
    }

    /// Sky bounds of one HDU, delegated to the extended operations.
    ///
    /// `Ok(None)` when no extension is configured or the header lacks
    /// footprint keywords.
    pub fn hdu_bounds(&mut self, md5: &str, hduidx: usize) -> Result<Option<HduBounds>> {
        if self.ext.is_none() {
            return Ok(None);
        }
        let headers = self.fits_header(md5)?;
        let Some(header) = headers.get(hduidx) else {
            return Err(Error::BadResponse(format!(
                "no HDU {hduidx} in header for {md5}"
            )));
        };
        Ok(self.ext.as_ref().and_then(|ext| ext.hdu_bounds(header)))
    }

    /// Pass a response through, or decode its error payload.
    fn success(&self, res: Response) -> Result<Response> {
        if res.status().is_success() {
            return Ok(res);
        }
        let err = Error::from_response(res);
        if self.verbose {
            if let Some(tb) = err.traceback() {
                debug!(traceback = %tb, "server traceback");
            }
        }
        Err(err)
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("api_url", &self.api_url)
            .field("api_version", &self.api_version)
            .field("verbose", &self.verbose)
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("headers", &self.headers)
            .field("ext", &self.ext.as_ref().map(|_| "..."))
            .finish()
    }
}

impl fmt::Display for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(astrogetr:{}, api:{}, {}, verbose={}, connect_timeout={}, read_timeout={})",
            env!("CARGO_PKG_VERSION"),
            self.api_version,
            self.api_url,
            self.verbose,
            self.connect_timeout.as_secs_f64(),
            self.read_timeout.as_secs_f64()
        )
    }
}

fn value_as_u32(value: &serde_json::Value) -> Option<u32> {
    value.as_u64().and_then(|v| u32::try_from(v).ok())
}

/// Incompatible when the server's major version is ahead by one or
/// more. Equal or older majors are accepted.
fn version_incompatible(server: f64, expected: f64) -> bool {
    server.trunc() - expected.trunc() >= 1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_major_is_compatible() {
        assert!(!version_incompatible(8.0, 8.0));
        assert!(!version_incompatible(8.9, 8.0));
    }

    #[test]
    fn test_older_server_is_accepted() {
        assert!(!version_incompatible(7.2, 8.0));
    }

    #[test]
    fn test_newer_major_is_rejected() {
        assert!(version_incompatible(9.0, 8.0));
        assert!(version_incompatible(10.5, 8.0));
    }
}
