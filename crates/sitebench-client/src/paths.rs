//! API root and base URL resolution for pages served directly or behind a
//! path-rewriting development proxy (`/<workspace>/.../proxy/<port>/...`).

use thiserror::Error;
use url::Url;

/// Pages live one directory below the API root unless told otherwise.
pub const DEFAULT_API_ROOT: &str = "../";
const PROXY_SEGMENT: &str = "proxy";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("page url must be an absolute http(s) url: {0}")]
    InvalidPageUrl(String),
    #[error("cannot resolve `{reference}` against the page: {message}")]
    Unresolvable { reference: String, message: String },
    #[error("redirect target `{target}` leaves origin {origin}")]
    CrossOrigin { target: String, origin: String },
}

/// Where to anchor absolute (`/`-prefixed) redirect targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RedirectMode {
    /// Concatenate onto the proxy-aware base URL.
    #[default]
    ProxyBase,
    /// Concatenate onto the API root, resolved against the page.
    ApiRoot,
}

impl RedirectMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ProxyBase => "proxy_base",
            Self::ApiRoot => "api_root",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "proxy_base" | "proxy-base" | "base" => Some(Self::ProxyBase),
            "api_root" | "api-root" | "root" => Some(Self::ApiRoot),
            _ => None,
        }
    }
}

/// The URL the page was loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLocation {
    url: Url,
}

impl PageLocation {
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let trimmed = raw.trim();
        let url = Url::parse(trimmed).map_err(|_| PathError::InvalidPageUrl(trimmed.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(PathError::InvalidPageUrl(trimmed.to_string()));
        }
        Ok(Self { url })
    }

    #[must_use]
    pub fn href(&self) -> &str {
        self.url.as_str()
    }

    #[must_use]
    pub fn pathname(&self) -> &str {
        self.url.path()
    }

    /// `scheme://host[:port]` without a trailing slash.
    #[must_use]
    pub fn origin(&self) -> String {
        self.url.origin().ascii_serialization()
    }

    /// Resolve `reference` the way a browser resolves a link on this page.
    pub fn resolve(&self, reference: &str) -> Result<Url, PathError> {
        self.url
            .join(reference)
            .map_err(|error| PathError::Unresolvable {
                reference: reference.to_string(),
                message: error.to_string(),
            })
    }
}

#[derive(Debug, Clone)]
pub struct PathResolver {
    location: PageLocation,
    api_root_override: Option<String>,
}

impl PathResolver {
    #[must_use]
    pub fn new(location: PageLocation) -> Self {
        Self {
            location,
            api_root_override: None,
        }
    }

    /// Blank overrides are ignored; a missing trailing `/` is added.
    #[must_use]
    pub fn with_api_root(mut self, api_root: Option<&str>) -> Self {
        self.api_root_override = api_root
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| {
                if value.ends_with('/') {
                    value.to_string()
                } else {
                    format!("{value}/")
                }
            });
        self
    }

    #[must_use]
    pub fn location(&self) -> &PageLocation {
        &self.location
    }

    #[must_use]
    pub fn api_root(&self) -> String {
        self.api_root_override
            .clone()
            .unwrap_or_else(|| DEFAULT_API_ROOT.to_string())
    }

    /// `api_root() + name`, e.g. `../api/env`.
    #[must_use]
    pub fn endpoint(&self, name: &str) -> String {
        format!("{}{}", self.api_root(), name.trim_start_matches('/'))
    }

    /// Origin plus the proxy prefix (through the segment after `proxy`), with a
    /// trailing `/`. Just the origin and `/` when the page is not proxied.
    #[must_use]
    pub fn base_url(&self) -> String {
        let origin = self.location.origin();
        // Empty segments stay in place so `/ws//proxy/..` keeps its exact prefix.
        let segments = self.location.pathname().split('/').collect::<Vec<_>>();

        match segments.iter().position(|segment| *segment == PROXY_SEGMENT) {
            Some(index) if segments.get(index + 1).is_some_and(|port| !port.is_empty()) => {
                format!("{origin}{}/", segments[..=index + 1].join("/"))
            }
            _ => format!("{origin}/"),
        }
    }

    /// Turn a server-issued redirect into the navigation target.
    ///
    /// Page-relative targets are returned unchanged. Absolute application paths
    /// keep every segment and are anchored per `mode`. Either way the target
    /// must stay on the page origin.
    pub fn redirect_target(&self, redirect: &str, mode: RedirectMode) -> Result<String, PathError> {
        let Some(app_path) = redirect.strip_prefix('/') else {
            self.ensure_same_origin(redirect)?;
            return Ok(redirect.to_string());
        };

        let target = match mode {
            RedirectMode::ProxyBase => format!("{}{app_path}", self.base_url()),
            RedirectMode::ApiRoot => self
                .location
                .resolve(&format!("{}{app_path}", self.api_root()))?
                .to_string(),
        };
        self.ensure_same_origin(&target)?;
        Ok(target)
    }

    fn ensure_same_origin(&self, target: &str) -> Result<(), PathError> {
        let resolved = self.location.resolve(target)?;
        let origin = self.location.origin();
        if resolved.origin().ascii_serialization() != origin {
            return Err(PathError::CrossOrigin {
                target: target.to_string(),
                origin,
            });
        }
        Ok(())
    }
}
