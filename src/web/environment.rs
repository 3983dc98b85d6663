use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Hosting environment the process runs in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HostEnvironment {
    Development,
    Test,
    Staging,
    #[default]
    Production,
}

impl HostEnvironment {
    /// Classify an environment name, case-insensitively.
    ///
    /// Unrecognised names are treated as production.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "local" | "dev" | "development" => HostEnvironment::Development,
            "test" => HostEnvironment::Test,
            "staging" => HostEnvironment::Staging,
            _ => HostEnvironment::Production,
        }
    }

    /// Whether error responses may include a stack trace.
    pub fn exposes_error_details(&self) -> bool {
        matches!(self, HostEnvironment::Development | HostEnvironment::Test)
    }
}

impl FromStr for HostEnvironment {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl fmt::Display for HostEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HostEnvironment::Development => "Development",
            HostEnvironment::Test => "Test",
            HostEnvironment::Staging => "Staging",
            HostEnvironment::Production => "Production",
        };
        f.write_str(name)
    }
}
