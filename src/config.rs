use std::path::PathBuf;

use aws_config::{BehaviorVersion, Region};
use clap::{Args, Parser, Subcommand};

use crate::{gateway::UploadPolicy, util::object};

#[derive(Debug, Parser)]
#[command(name = "objectgw", version, about = "Gateway to an S3-compatible object store")]
pub struct Cli {
    #[command(flatten)]
    pub store: StoreArgs,

    #[command(flatten)]
    pub policy: PolicyArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Connection settings. Credentials come from the standard AWS provider chain.
#[derive(Debug, Args)]
pub struct StoreArgs {
    #[arg(long, env = "OBJECTGW_ENDPOINT", global = true)]
    pub endpoint: Option<String>,

    #[arg(long, env = "OBJECTGW_REGION", global = true)]
    pub region: Option<String>,

    /// Path-style addressing, needed by most self-hosted stores.
    #[arg(long, env = "OBJECTGW_PATH_STYLE", global = true)]
    pub path_style: bool,
}

impl StoreArgs {
    pub async fn load(&self) -> aws_sdk_s3::Config {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());

        if let Some(region) = &self.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(endpoint) = &self.endpoint {
            loader = loader.endpoint_url(endpoint);
        }

        let shared = loader.load().await;

        aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(self.path_style)
            .build()
    }
}

#[derive(Debug, Args)]
pub struct PolicyArgs {
    /// Largest accepted upload in bytes.
    #[arg(long, env = "OBJECTGW_MAX_UPLOAD_SIZE", global = true)]
    pub max_upload_size: Option<u64>,

    /// Comma separated content type prefixes, e.g. `image/,text/plain`.
    #[arg(long, env = "OBJECTGW_ALLOWED_TYPES", value_delimiter = ',', global = true)]
    pub allowed_types: Vec<String>,
}

impl PolicyArgs {
    pub fn to_policy(&self) -> UploadPolicy {
        UploadPolicy {
            max_size: self.max_upload_size,
            allowed_types: self
                .allowed_types
                .iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Health,
    /// Reports whether an object exists, with its metadata.
    Exists {
        #[arg(value_parser = parse_location)]
        location: ObjectLocation,
    },
    Info {
        #[arg(value_parser = parse_location)]
        location: ObjectLocation,
    },
    /// Uploads a local file, or stdin when SOURCE is `-`.
    Upload {
        source: PathBuf,
        #[arg(value_parser = parse_location)]
        location: ObjectLocation,
        #[arg(long)]
        content_type: Option<String>,
    },
    /// Downloads into DESTINATION without overwriting existing files.
    Download {
        #[arg(value_parser = parse_location)]
        location: ObjectLocation,
        destination: PathBuf,
    },
    /// Streams an object to stdout.
    Cat {
        #[arg(value_parser = parse_location)]
        location: ObjectLocation,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

fn parse_location(uri: &str) -> Result<ObjectLocation, String> {
    object::parse_object_uri(uri)
        .map(|(bucket, key)| ObjectLocation {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
        .ok_or_else(|| format!("expected s3://BUCKET/KEY, got: {}", uri))
}
