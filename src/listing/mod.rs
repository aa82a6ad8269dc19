//! Directory listing resolver
//!
//! Web servers render directory indexes as an HTML page, conventionally with
//! one link per entry inside a `<table>`. This module fetches such a page,
//! collects the relative links found inside table regions and picks the first
//! file carrying a required suffix, which is how the Windows Application
//! Server installer is located on an OVD download mirror.
//!
//! # Example
//!
//! ```rust,ignore
//! use ovd_modules::listing::DirectoryListingResolver;
//!
//! let resolver = DirectoryListingResolver::new(&config.http)?;
//! let setup = resolver
//!     .resolve("https://mirror.example.com/ovd/windows/", "ApplicationServer.exe")
//!     .await?;
//! ```

mod parse;

use std::time::Duration;

use reqwest::Client;
use tracing::{debug, info};

use crate::config::HttpConfig;
use crate::error::{Error, Result};

/// One link found in a directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkEntry {
    /// Link target, without the trailing slash for folders
    pub target: String,
    /// Whether the href designated a folder
    pub is_folder: bool,
}

impl LinkEntry {
    /// Classify a raw href.
    pub fn from_href(href: impl Into<String>) -> Self {
        let href = href.into();
        match href.strip_suffix('/') {
            Some(folder) => Self {
                target: folder.to_string(),
                is_folder: true,
            },
            None => Self {
                target: href,
                is_folder: false,
            },
        }
    }
}

/// Entries of a directory listing, in document order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryListing {
    entries: Vec<LinkEntry>,
}

impl DirectoryListing {
    /// Scan an HTML page.
    pub fn parse(html: &str) -> Self {
        parse::scan(html)
    }

    /// All entries in discovery order
    pub fn entries(&self) -> &[LinkEntry] {
        &self.entries
    }

    /// File names in discovery order
    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|e| !e.is_folder)
            .map(|e| e.target.as_str())
    }

    /// Folder names in discovery order
    pub fn folders(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|e| e.is_folder)
            .map(|e| e.target.as_str())
    }

    /// First file whose name ends with `suffix`
    pub fn find_file(&self, suffix: &str) -> Option<&str> {
        self.files().find(|f| f.ends_with(suffix))
    }
}

/// Fetches directory listings and resolves file names from them
#[derive(Debug, Clone)]
pub struct DirectoryListingResolver {
    client: Client,
}

impl DirectoryListingResolver {
    /// Build a resolver with the configured timeout and certificate policy
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .danger_accept_invalid_certs(!config.validate_certs)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// Download and scan the listing at `url`
    pub async fn fetch(&self, url: &str) -> Result<DirectoryListing> {
        debug!(url = %url, "Fetching directory listing");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::fetch(url, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::fetch(url, format!("HTTP status {}", status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::fetch(url, format!("Failed to read body: {}", e)))?;

        let listing = DirectoryListing::parse(&body);
        debug!(
            entries = listing.entries().len(),
            "Directory listing scanned"
        );
        Ok(listing)
    }

    /// Name of the first file at `url` ending with `suffix`
    pub async fn resolve(&self, url: &str, suffix: &str) -> Result<String> {
        let listing = self.fetch(url).await?;

        let name = listing
            .find_file(suffix)
            .ok_or_else(|| Error::not_found(url, suffix))?;

        info!(url = %url, file = %name, "Resolved listing entry");
        Ok(name.to_string())
    }
}
