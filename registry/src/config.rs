use std::convert::Infallible;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use envconfig::Envconfig;

use crate::identity::{FullMetadataIdentity, IdentityResolver, LabelSubsetIdentity};

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(default = "127.0.0.1:3000")]
    pub address: SocketAddr,

    /// How long a document stays readable after its last publish.
    #[envconfig(default = "7200")]
    pub document_ttl: EnvSecsDuration,

    #[envconfig(default = "60")]
    pub expiry_sweep_interval: EnvSecsDuration,

    /// Labels that identify a document. Empty means all of them.
    #[envconfig(default = "")]
    pub identity_labels: IdentityLabels,

    #[envconfig(default = "true")]
    pub export_prometheus: bool,
}

impl Config {
    pub fn identity(&self) -> Arc<dyn IdentityResolver + Send + Sync> {
        match self.identity_labels.0.is_empty() {
            true => Arc::new(FullMetadataIdentity),
            false => Arc::new(LabelSubsetIdentity::new(self.identity_labels.0.clone())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvSecsDuration(pub time::Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvSecsDurationError;

impl FromStr for EnvSecsDuration {
    type Err = ParseEnvSecsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let secs = s.parse::<u32>().map_err(|_| ParseEnvSecsDurationError)?;
        if secs == 0 {
            return Err(ParseEnvSecsDurationError);
        }

        Ok(EnvSecsDuration(time::Duration::seconds(i64::from(secs))))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityLabels(pub Vec<String>);

impl FromStr for IdentityLabels {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(IdentityLabels(
            s.split(',')
                .map(str::trim)
                .filter(|label| !label.is_empty())
                .map(String::from)
                .collect(),
        ))
    }
}
