//! Dataverse connection settings

use std::fmt;

/// Default Azure AD authority used for client-credential tokens
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Credentials for a Dataverse organization
#[derive(Clone, Default, PartialEq)]
pub struct ConnectionSettings {
    pub org_url: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub tenant_id: Option<String>,
}

impl fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("org_url", &self.org_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "***"))
            .field("tenant_id", &self.tenant_id)
            .finish()
    }
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().map_or(false, |v| !v.trim().is_empty())
}

impl ConnectionSettings {
    /// True when every credential is present and non-blank
    pub fn is_configured(&self) -> bool {
        present(&self.org_url)
            && present(&self.client_id)
            && present(&self.client_secret)
            && present(&self.tenant_id)
    }

    /// Org URL without a trailing slash
    pub fn base_url(&self) -> Option<String> {
        self.org_url
            .as_deref()
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
    }
}
