//! asset-forge inspection binary.
//!
//! Prints the rule key tree, the capability list each protocol tier resolves
//! to, and the stats of a registry holding a few demo assets, as JSON.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: tracing filter (default: "info,asset_forge=debug")
//! - `ASSET_FORGE_*`: see `ForgeSettings::from_env`
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin forge-inspect
//! ```

use std::sync::Arc;

use asset_forge::asset::{AssetFactory, AssetShell, ModelField, OperationToggles, ValueType};
use asset_forge::builders::{build_alias, build_enum, build_model, build_primitive};
use asset_forge::capabilities::ProtocolTier;
use asset_forge::config::ForgeSettings;
use asset_forge::registry::TypeRegistry;
use asset_forge::rules::{keys, RuleArgs, RuleTable};
use serde_json::{json, Map, Value};

const DEMO_REGISTRY: &str = "forge-inspect";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,asset_forge=debug".into()),
        )
        .init();

    let settings = ForgeSettings::from_env();
    tracing::info!("forge-inspect starting with {:?}", settings);
    let factory = Arc::new(AssetFactory::new(settings));

    let table = RuleTable::global();
    let loaded = table.ensure_loaded().await;
    tracing::info!("rule catalogue loaded ({} bindings)", loaded);
    let key_tree: Vec<String> = table
        .registered_keys()
        .await
        .iter()
        .map(|k| k.path().to_string())
        .collect();

    let mut tiers = Map::new();
    for tier in ProtocolTier::ALL {
        let applied = factory.resolve_capabilities(tier, &OperationToggles::default(), false);
        tiers.insert(tier.as_str().to_string(), serde_json::to_value(applied)?);
    }

    let registry = TypeRegistry::named(DEMO_REGISTRY);
    register_demo_assets(&factory, &registry).await?;
    let stats = registry.stats().await;

    let report = json!({
        "version": asset_forge::VERSION,
        "rule_keys": key_tree,
        "tiers": Value::Object(tiers),
        "registry": stats,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    asset_forge::runtime::shutdown();
    Ok(())
}

async fn register_demo_assets(factory: &Arc<AssetFactory>, registry: &Arc<TypeRegistry>) -> anyhow::Result<()> {
    let text = build_primitive(ValueType::String)
        .description("Plain text")
        .tags(["core/text"])
        .factory(factory.clone())
        .registry(registry.clone())
        .apply_async("Text")
        .await?;

    build_alias(&text)
        .rule(keys::valid::string::IS_EMAIL)
        .tags(["core/text/email", "pii"])
        .factory(factory.clone())
        .registry(registry.clone())
        .apply_async(AssetShell::new("Email").doc("An email address."))
        .await?;

    build_primitive(ValueType::Integer)
        .rule((keys::valid::numeric::IN_RANGE, RuleArgs::positional([1, 65535])))
        .tags(["net"])
        .factory(factory.clone())
        .registry(registry.clone())
        .apply_async("Port")
        .await?;

    build_model()
        .field(ModelField::new("host", ValueType::String).rule(keys::valid::string::IS_NON_EMPTY))
        .field(ModelField::new("ttl", ValueType::TimeDelta).optional().default_value("5m"))
        .caching(true)
        .tags(["net/endpoint"])
        .factory(factory.clone())
        .registry(registry.clone())
        .apply_async("Endpoint")
        .await?;

    build_enum()
        .base_type(ValueType::String)
        .variant("Active", "active")
        .variant("Retired", "retired")
        .tier(ProtocolTier::Advanced)
        .factory(factory.clone())
        .registry(registry.clone())
        .apply_async("Status")
        .await?;

    Ok(())
}
