//! Static mapping of logical service names to RPC endpoints.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

/// Errors raised by address book lookups and construction.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AddressError {
    /// The requested logical name is not part of the catalogue.
    #[error("unknown service: {0}")]
    UnknownService(String),

    /// An override could not be parsed as an endpoint URL.
    #[error("invalid endpoint for {service}: {reason}")]
    InvalidEndpoint { service: ServiceName, reason: String },
}

/// Logical name of a downstream service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceName {
    Users,
    Posts,
    Chat,
    Notifications,
    Media,
    Forum,
}

impl ServiceName {
    /// Every service, in startup order.
    pub const ALL: [ServiceName; 6] = [
        ServiceName::Users,
        ServiceName::Posts,
        ServiceName::Chat,
        ServiceName::Notifications,
        ServiceName::Media,
        ServiceName::Forum,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceName::Users => "users",
            ServiceName::Posts => "posts",
            ServiceName::Chat => "chat",
            ServiceName::Notifications => "notifications",
            ServiceName::Media => "media",
            ServiceName::Forum => "forum",
        }
    }

    /// Environment variable that overrides the default endpoint.
    pub fn env_var(&self) -> &'static str {
        match self {
            ServiceName::Users => "USERS_ADDR",
            ServiceName::Posts => "POSTS_ADDR",
            ServiceName::Chat => "CHAT_ADDR",
            ServiceName::Notifications => "NOTIFICATIONS_ADDR",
            ServiceName::Media => "MEDIA_ADDR",
            ServiceName::Forum => "FORUM_ADDR",
        }
    }

    /// Compile-time default endpoint.
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            ServiceName::Users => "http://127.0.0.1:50051",
            ServiceName::Posts => "http://127.0.0.1:50052",
            ServiceName::Chat => "http://127.0.0.1:50053",
            ServiceName::Notifications => "http://127.0.0.1:50054",
            ServiceName::Media => "http://127.0.0.1:50055",
            ServiceName::Forum => "http://127.0.0.1:50056",
        }
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceName {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ServiceName::ALL
            .into_iter()
            .find(|name| name.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| AddressError::UnknownService(s.to_string()))
    }
}

/// Read-only table of service endpoints, resolved once at startup.
#[derive(Debug, Clone)]
pub struct AddressBook {
    endpoints: HashMap<ServiceName, String>,
}

impl AddressBook {
    /// Build the table from defaults plus overrides.
    ///
    /// Overrides may omit the scheme (`host:port`), in which case `http://` is assumed.
    pub fn resolve(overrides: &HashMap<ServiceName, String>) -> Result<Self, AddressError> {
        let mut endpoints = HashMap::with_capacity(ServiceName::ALL.len());
        for service in ServiceName::ALL {
            let endpoint = match overrides.get(&service) {
                Some(raw) => normalize_endpoint(service, raw)?,
                None => service.default_endpoint().to_string(),
            };
            endpoints.insert(service, endpoint);
        }
        Ok(Self { endpoints })
    }

    /// Endpoint for a known service.
    pub fn get(&self, service: ServiceName) -> &str {
        // Every variant is inserted by `resolve`.
        self.endpoints
            .get(&service)
            .map(String::as_str)
            .unwrap_or_else(|| service.default_endpoint())
    }

    /// Endpoint for a service given by name.
    pub fn lookup(&self, name: &str) -> Result<&str, AddressError> {
        let service: ServiceName = name.parse()?;
        Ok(self.get(service))
    }

    /// Iterate entries in startup order.
    pub fn iter(&self) -> impl Iterator<Item = (ServiceName, &str)> + '_ {
        ServiceName::ALL.into_iter().map(move |s| (s, self.get(s)))
    }
}

impl Default for AddressBook {
    fn default() -> Self {
        let endpoints = ServiceName::ALL
            .into_iter()
            .map(|s| (s, s.default_endpoint().to_string()))
            .collect();
        Self { endpoints }
    }
}

fn normalize_endpoint(service: ServiceName, raw: &str) -> Result<String, AddressError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(AddressError::InvalidEndpoint {
            service,
            reason: "empty endpoint".to_string(),
        });
    }

    let candidate = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{}", raw)
    };

    let url = url::Url::parse(&candidate).map_err(|e| AddressError::InvalidEndpoint {
        service,
        reason: e.to_string(),
    })?;

    if url.host_str().is_none() || url.port_or_known_default().is_none() {
        return Err(AddressError::InvalidEndpoint {
            service,
            reason: "endpoint must include host and port".to_string(),
        });
    }

    Ok(candidate.trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_service() {
        let book = AddressBook::resolve(&HashMap::new()).unwrap();
        for service in ServiceName::ALL {
            assert_eq!(book.get(service), service.default_endpoint());
        }
    }

    #[test]
    fn override_without_scheme_gets_http() {
        let mut overrides = HashMap::new();
        overrides.insert(ServiceName::Users, "users.internal:9000".to_string());
        let book = AddressBook::resolve(&overrides).unwrap();
        assert_eq!(book.get(ServiceName::Users), "http://users.internal:9000");
        assert_eq!(book.lookup("users").unwrap(), "http://users.internal:9000");
    }

    #[test]
    fn unknown_service_is_rejected() {
        let book = AddressBook::default();
        assert_eq!(
            book.lookup("billing"),
            Err(AddressError::UnknownService("billing".to_string()))
        );
    }

    #[test]
    fn empty_override_is_rejected() {
        let mut overrides = HashMap::new();
        overrides.insert(ServiceName::Media, "  ".to_string());
        assert!(matches!(
            AddressBook::resolve(&overrides),
            Err(AddressError::InvalidEndpoint { service: ServiceName::Media, .. })
        ));
    }

    #[test]
    fn service_name_parse_is_case_insensitive() {
        assert_eq!("Forum".parse::<ServiceName>().unwrap(), ServiceName::Forum);
        assert_eq!(ServiceName::Notifications.env_var(), "NOTIFICATIONS_ADDR");
    }
}
