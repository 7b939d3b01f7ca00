use std::env;

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

/// Process settings, read from the environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    /// Namespace to watch, `None` watches all namespaces.
    pub watch_namespace: Option<String>,
    pub listen_addr: String,
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Settings {
            watch_namespace: lookup("WATCH_NAMESPACE").filter(|ns| !ns.is_empty()),
            listen_addr: lookup("LISTEN_ADDR")
                .filter(|addr| !addr.is_empty())
                .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_environment_uses_defaults() {
        let settings = Settings::from_lookup(|_| None);
        assert_eq!(settings.watch_namespace, None);
        assert_eq!(settings.listen_addr, DEFAULT_LISTEN_ADDR);
    }

    #[test]
    fn environment_overrides_defaults() {
        let vars = HashMap::from([
            ("WATCH_NAMESPACE", "databases".to_string()),
            ("LISTEN_ADDR", "127.0.0.1:9000".to_string()),
        ]);
        let settings = Settings::from_lookup(|key| vars.get(key).cloned());
        assert_eq!(settings.watch_namespace.as_deref(), Some("databases"));
        assert_eq!(settings.listen_addr, "127.0.0.1:9000");
    }

    #[test]
    fn blank_namespace_means_all_namespaces() {
        let settings = Settings::from_lookup(|key| (key == "WATCH_NAMESPACE").then(String::new));
        assert_eq!(settings.watch_namespace, None);
    }
}
