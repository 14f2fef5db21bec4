use std::collections::BTreeMap;
use std::path;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use log::{debug, info};
use tap::Tap;

use identify::content::Content;
use identify::mimetype_map::MimetypeMap;
use metadata::{
    MappingMetadataExtracter, MetadataExtracter, MetadataExtracterRegistry, OverwritePolicy, PropertyMap, QName,
    Rfc822MetadataExtracter, TikaMetadataExtracter, TikaProfile, TransformMetadataExtracter, Value,
};
use services::{log_err, Config};
use transform::{
    default_engines, ConfigSource, LocalTransformServiceRegistry, TransformOptions, TransformerDebug,
    DEFAULT_PIPELINE_CONFIG, UNLIMITED,
};

#[derive(Parser, Debug)]
#[command(name = "rusty-metadata")]
struct Args {
    #[arg(long, default_value = "info", global = true)]
    log_level: log::Level,

    /// A YAML file of properties for limits, mappings and enable flags.
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the properties extracted from a file as JSON.
    Extract {
        #[arg(short = 'i', long, value_parser = parse_input_file)]
        input: PathBuf,

        #[arg(short = 'm', long)]
        mimetype: String,

        #[arg(short = 'p', long, default_value = "PRAGMATIC")]
        policy: OverwritePolicy,
    },

    /// Write properties into a copy of a file.
    Embed {
        #[arg(short = 'i', long, value_parser = parse_input_file)]
        input: PathBuf,

        #[arg(short = 'o', long)]
        output: PathBuf,

        #[arg(short = 'm', long)]
        mimetype: String,

        /// A property as `prefix:name=value`.
        #[arg(long = "property", value_parser = parse_key_value)]
        properties: Vec<(String, String)>,
    },

    /// Transform a file with the local transforms.
    Transform {
        #[arg(short = 'i', long, value_parser = parse_input_file)]
        input: PathBuf,

        #[arg(short = 'm', long)]
        mimetype: String,

        #[arg(short = 'o', long)]
        output: PathBuf,

        #[arg(short = 't', long)]
        target: String,

        /// A transform option as `name=value`.
        #[arg(long = "option", value_parser = parse_key_value)]
        options: Vec<(String, String)>,

        #[arg(short = 'r', long)]
        rendition: Option<String>,

        /// A JSON file, or a directory of them, with more pipeline and failover transforms.
        #[arg(long)]
        pipeline_config: Option<PathBuf>,

        /// Print the trace of the transform.
        #[arg(long)]
        debug: bool,
    },

    /// List the transforms from a source mimetype.
    List {
        #[arg(short = 's', long)]
        source: String,

        #[arg(short = 't', long)]
        target: Option<String>,

        #[arg(long)]
        pipeline_config: Option<PathBuf>,
    },
}

fn parse_input_file(path_str: &str) -> Result<path::PathBuf, String> {
    let path = path::PathBuf::from(path_str.to_string());
    if !path.exists() {
        return Err(format!("Path {} not found", path_str))
    }
    if !path.is_file() {
        return Err(format!("Path {} is not a file", path_str))
    }
    Ok(path)
}

fn parse_key_value(arg: &str) -> Result<(String, String), String> {
    arg.split_once('=')
        .map(|(key, value)| (key.trim().to_string(), value.to_string()))
        .filter(|(key, _)| !key.is_empty())
        .ok_or_else(|| format!("Expected name=value, got {}", arg))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    simple_logger::init_with_level(args.log_level)?;

    let config = match &args.config {
        Some(path) => Config::from_yaml_file(path).await?,
        None => Config::default(),
    };

    match args.command {
        Command::Extract { input, mimetype, policy } => {
            let content = Content::from_path(&input, mimetype).await;
            let registry = extracter_registry(&config).await?;
            extract(&registry, &content, policy).await
        }
        Command::Embed { input, output, mimetype, properties } => {
            let source = Content::from_path(&input, &mimetype).await;
            let target = Content::new(output, mimetype, 0);
            let registry = extracter_registry(&config).await?;
            embed(&registry, &source, &target, properties).await
        }
        Command::Transform { input, mimetype, output, target, options, rendition, pipeline_config, debug } => {
            let content = Content::from_path(&input, mimetype).await;
            let registry = transform_registry(&config, pipeline_config).await?;
            let options: TransformOptions = options.into_iter().collect();
            run_transform(&registry, &content, &output, &target, &options, rendition.as_deref(), debug).await
        }
        Command::List { source, target, pipeline_config } => {
            let registry = transform_registry(&config, pipeline_config).await?;
            list(&registry, &source, target.as_deref());
            Ok(())
        }
    }
}

/// Build the local transform registry from the built-in engines and pipelines, and any extra configuration.
///
/// Configuration errors are logged; the transforms that are valid can still be used.
///
async fn transform_registry(
    config: &Config,
    pipeline_config: Option<PathBuf>,
) -> anyhow::Result<Arc<LocalTransformServiceRegistry>> {
    let mut builder = LocalTransformServiceRegistry::builder()
        .engines(default_engines())
        .config_source(ConfigSource::Inline(DEFAULT_PIPELINE_CONFIG.to_string()))
        .config(config.clone());
    if let Some(path) = pipeline_config {
        builder = builder.config_source(if path.is_dir() {
            ConfigSource::Dir(path)
        } else {
            ConfigSource::File(path)
        });
    }

    let registry = builder.build();
    registry
        .read_config()
        .await
        .tap(log_err!("Local transform configuration has errors"))?;
    Ok(Arc::new(registry))
}

/// Register the extracters. Later registrations win, so the format specific extracters are registered after the
/// one that goes through the local transforms.
///
async fn extracter_registry(config: &Config) -> anyhow::Result<MetadataExtracterRegistry> {
    let registry = MetadataExtracterRegistry::new();
    let mimetypes = Arc::new(MimetypeMap::default());

    let transforms = transform_registry(config, None).await?;
    registry.register(Arc::new(
        MappingMetadataExtracter::builder(TransformMetadataExtracter::new(transforms))
            .config(config.clone())
            .mimetype_map(mimetypes.clone())
            .build()?,
    ));
    for profile in [TikaProfile::Auto, TikaProfile::Pdf, TikaProfile::Office] {
        registry.register(Arc::new(
            MappingMetadataExtracter::builder(TikaMetadataExtracter::new(profile))
                .config(config.clone())
                .mimetype_map(mimetypes.clone())
                .build()?,
        ));
    }
    registry.register(Arc::new(
        MappingMetadataExtracter::builder(Rfc822MetadataExtracter::new())
            .config(config.clone())
            .mimetype_map(mimetypes)
            .build()?,
    ));

    Ok(registry)
}

async fn extract(registry: &MetadataExtracterRegistry, content: &Content, policy: OverwritePolicy) -> anyhow::Result<()> {
    info!("Extracting metadata from {} with the {:?} policy", content.mimetype, policy);

    let extracter = registry
        .get_extracter(&content.mimetype)
        .ok_or_else(|| anyhow!("no metadata extracter for {}", content.mimetype))?;
    debug!("Using {}", extracter.name());
    let mut properties = PropertyMap::new();
    let changed = extracter.extract_with(content, policy, &mut properties, None).await?;

    let output: BTreeMap<String, Value> = changed
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect();
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn embed(
    registry: &MetadataExtracterRegistry,
    source: &Content,
    target: &Content,
    properties: Vec<(String, String)>,
) -> anyhow::Result<()> {
    let prefixes = QName::default_prefixes();
    let properties = properties
        .into_iter()
        .map(|(name, value)| Ok((QName::resolve(&name, &prefixes)?, Value::from(value))))
        .collect::<anyhow::Result<PropertyMap>>()?;

    registry.embed(&properties, source, target).await?;
    info!("Embedded {} properties into {}", properties.len(), target.path.display());
    Ok(())
}

async fn run_transform(
    registry: &LocalTransformServiceRegistry,
    content: &Content,
    output: &path::Path,
    target_mimetype: &str,
    options: &TransformOptions,
    rendition: Option<&str>,
    print_debug: bool,
) -> anyhow::Result<()> {
    let debug = TransformerDebug::new();
    if print_debug {
        debug.capture();
    }

    let result = registry
        .transform_with_debug(content, output, target_mimetype, options, rendition, &debug)
        .await
        .with_context(|| format!("failed to transform {} to {}", content.mimetype, target_mimetype));

    if let Some(captured) = debug.captured() {
        println!("{}", captured);
    }
    result?;

    info!("Wrote {}", output.display());
    Ok(())
}

fn list(registry: &LocalTransformServiceRegistry, source: &str, target: Option<&str>) {
    for (target_mimetype, transforms) in registry.transforms_from(source) {
        if target.is_some_and(|target| target != target_mimetype) {
            continue;
        }
        for transform in transforms {
            let max_size = if transform.max_source_size_bytes == UNLIMITED {
                "unlimited".to_string()
            } else {
                bytesize::ByteSize(transform.max_source_size_bytes as u64).to_string()
            };
            println!(
                "{}\t{}\t{}\tpriority {}",
                target_mimetype, transform.name, max_size, transform.priority
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_extracter_registry_from_defaults() -> anyhow::Result<()> {
        let registry = extracter_registry(&Config::default()).await?;

        assert!(registry.get_extracter("message/rfc822").is_some());
        assert!(registry.get_extracter("application/pdf").is_some());
        Ok(())
    }
}
