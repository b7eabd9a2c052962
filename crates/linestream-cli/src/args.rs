//! Command-line arguments

use clap::{Parser, ValueEnum};
use linestream_core::{
    Credentials, GrantType, HttpMethod, RequestDescriptor, StreamConfig, StreamError,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

#[derive(Debug, Parser)]
#[command(
    name = "linestream",
    version,
    about = "Follow a newline-delimited JSON stream and print each message"
)]
pub struct Args {
    /// Stream URL, query parameters included
    pub url: Url,

    #[arg(long, value_enum, default_value_t = MethodArg::Get)]
    pub method: MethodArg,

    /// Extra request header, `Name: value` (repeatable)
    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Bearer token for application-only access
    #[arg(long)]
    pub bearer: Option<String>,

    #[arg(long)]
    pub consumer_key: Option<String>,

    #[arg(long)]
    pub consumer_secret: Option<String>,

    #[arg(long)]
    pub access_token: Option<String>,

    #[arg(long)]
    pub access_token_secret: Option<String>,

    /// Access the credentials must grant (defaults to the config, or `app` for bearer-only)
    #[arg(long, value_enum)]
    pub grant: Option<GrantArg>,

    /// Override the stall threshold
    #[arg(long)]
    pub stall_timeout_ms: Option<u64>,

    #[arg(long, default_value_t = 30)]
    pub connect_timeout_secs: u64,

    /// Stop after this many messages
    #[arg(long)]
    pub max_messages: Option<usize>,

    /// Config file (default: ~/.linestream/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MethodArg {
    Get,
    Post,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GrantArg {
    App,
    User,
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected `Name: value`, got `{}`", raw))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty header name in `{}`", raw));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

impl Args {
    pub fn credentials(&self) -> Credentials {
        Credentials {
            consumer_key: self.consumer_key.clone(),
            consumer_secret: self.consumer_secret.clone(),
            access_token: self.access_token.clone(),
            access_token_secret: self.access_token_secret.clone(),
            bearer_token: self.bearer.clone(),
        }
    }

    fn has_user_credentials(&self) -> bool {
        self.consumer_key.is_some() || self.access_token.is_some()
    }

    /// Apply command-line overrides on top of the loaded config
    pub fn apply(&self, mut config: StreamConfig) -> Result<StreamConfig, StreamError> {
        if let Some(stall) = self.stall_timeout_ms {
            config = config.with_stall_timeout(Duration::from_millis(stall));
        }

        let grant = match self.grant {
            Some(GrantArg::App) => GrantType::App,
            Some(GrantArg::User) => GrantType::User,
            None if self.bearer.is_some() && !self.has_user_credentials() => GrantType::App,
            None => config.required_grant,
        };
        let config = config.with_required_grant(grant);
        config.validate()?;
        Ok(config)
    }

    /// Request sent on every connection attempt
    pub fn request(&self, credentials: Arc<Credentials>) -> RequestDescriptor {
        let method = match self.method {
            MethodArg::Get => HttpMethod::Get,
            MethodArg::Post => HttpMethod::Post,
        };

        let mut request = RequestDescriptor::new(method, self.url.clone())
            .with_credentials(credentials)
            .with_connect_timeout(Duration::from_secs(self.connect_timeout_secs));

        if let Some(token) = &self.bearer {
            request = request.with_header("Authorization", format!("Bearer {}", token));
        }
        for (name, value) in &self.headers {
            request = request.with_header(name.clone(), value.clone());
        }
        request
    }
}
