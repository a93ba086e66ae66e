/// Where chat replies are generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    /// The site's own chat endpoint.
    Site,
    /// A local Ollama server prompted with the reply protocol.
    Ollama,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Site => "site",
            Provider::Ollama => "ollama",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "site" => Some(Provider::Site),
            "ollama" => Some(Provider::Ollama),
            _ => None,
        }
    }

    pub fn all() -> Vec<Provider> {
        vec![Provider::Site, Provider::Ollama]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::Site => "Site chat endpoint",
            Provider::Ollama => "Ollama (Local)",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_names() {
        for provider in Provider::all() {
            assert_eq!(Provider::from_str(provider.as_str()), Some(provider));
        }
        assert_eq!(Provider::from_str("OLLAMA"), Some(Provider::Ollama));
        assert_eq!(Provider::from_str("claude"), None);
    }
}
