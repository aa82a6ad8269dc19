//! Windows Application Server installer lookup.
//!
//! Scans the directory listing at `ovd_url` and returns the name of the
//! first file ending with `suffix` (`ApplicationServer.exe` by default).

use super::{
    Module, ModuleClassification, ModuleContext, ModuleError, ModuleOutput, ModuleParams,
    ModuleResult, ParamExt,
};
use crate::error::Error;
use crate::listing::DirectoryListingResolver;
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::debug;

/// Suffix of the Windows Application Server setup program
pub const DEFAULT_SUFFIX: &str = "ApplicationServer.exe";

pub struct WindowsApsUrlModule;

#[async_trait]
impl Module for WindowsApsUrlModule {
    fn name(&self) -> &'static str {
        "ovd_windows_aps_url"
    }

    fn description(&self) -> &'static str {
        "Find the Windows Application Server setup in a directory listing"
    }

    fn classification(&self) -> ModuleClassification {
        ModuleClassification::HttpLookup
    }

    fn required_params(&self) -> &[&'static str] {
        &["ovd_url"]
    }

    fn optional_params(&self) -> HashMap<&'static str, serde_json::Value> {
        HashMap::from([("suffix", serde_json::json!(DEFAULT_SUFFIX))])
    }

    fn validate_params(&self, params: &ModuleParams) -> ModuleResult<()> {
        if let Some(url) = params.get_string("ovd_url")? {
            let parsed = url::Url::parse(&url).map_err(|e| {
                ModuleError::InvalidParameter(format!("ovd_url '{}' is not a URL: {}", url, e))
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ModuleError::InvalidParameter(format!(
                    "ovd_url must be an http or https URL, got '{}'",
                    url
                )));
            }
        }
        Ok(())
    }

    async fn execute(
        &self,
        params: &ModuleParams,
        context: &ModuleContext,
    ) -> ModuleResult<ModuleOutput> {
        let url = params.get_string_required("ovd_url")?;
        let suffix = params
            .get_string("suffix")?
            .unwrap_or_else(|| DEFAULT_SUFFIX.to_string());

        let resolver = DirectoryListingResolver::new(&context.config.http)?;
        let name = match resolver.resolve(&url, &suffix).await {
            Ok(name) => name,
            Err(Error::NotFound { .. }) => {
                return Err(ModuleError::ExecutionFailed(
                    "Unable to find the Windows APS setup at the given URL".to_string(),
                ))
            }
            Err(e) => return Err(e.into()),
        };

        debug!(setup = %name, "Windows APS setup found");

        // The lookup is reported as a change, like the playbooks expect
        Ok(ModuleOutput::changed(format!("Found {}", name))
            .with_data("result", serde_json::Value::String(name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: serde_json::Value) -> ModuleParams {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_validate_url_scheme() {
        let module = WindowsApsUrlModule;
        assert!(module
            .validate_params(&params(json!({"ovd_url": "https://mirror/ovd/"})))
            .is_ok());
        assert!(module
            .validate_params(&params(json!({"ovd_url": "ftp://mirror/ovd/"})))
            .is_err());
        assert!(module
            .validate_params(&params(json!({"ovd_url": "not a url"})))
            .is_err());
    }

    #[tokio::test]
    async fn test_unreachable_listing_is_fetch_error() {
        let err = WindowsApsUrlModule
            .execute(
                &params(json!({"ovd_url": "http://127.0.0.1:1/ovd/"})),
                &ModuleContext::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "FetchError");
    }
}
