//! End-to-end declarations through the public builders and registry.

use std::sync::Arc;

use asset_forge::asset::{AssetShell, ValueType};
use asset_forge::capabilities::{CapabilityName, ProtocolTier};
use asset_forge::registry::{self, TypeRegistry};
use asset_forge::{build_alias, build_enum, build_primitive, keys, AssetError, AssetFactory, AssetKind, ForgeSettings};
use serde_json::json;

fn unregistered_factory() -> Arc<AssetFactory> {
    Arc::new(AssetFactory::new(ForgeSettings {
        auto_register: false,
        ..Default::default()
    }))
}

#[tokio::test]
async fn email_alias_validates_through_rule_key() {
    let string = build_primitive(ValueType::String)
        .factory(unregistered_factory())
        .apply_async("StringPrimitive")
        .await
        .unwrap();
    let email = build_alias(&string)
        .rule(keys::valid::string::IS_EMAIL)
        .apply_async("Email")
        .await
        .unwrap();

    assert_eq!(email.metadata().asset_type, AssetKind::Alias);
    assert_eq!(email.metadata().get("asset_type"), Some(json!("alias")));

    let ok = email.validate(json!("a@b.com")).await.unwrap();
    assert_eq!(ok.value(), &json!("a@b.com"));

    let err = email.validate(json!("not-an-email")).await.unwrap_err();
    match err {
        AssetError::ValidationFailed { asset, failures } => {
            assert_eq!(asset, "Email");
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].rule, "is_email");
            assert_eq!(failures[0].message, "'not-an-email' is not a valid email address");
        }
        other => panic!("expected ValidationFailed, got {other:?}"),
    }

    let registered = registry::get_type("Email").await.unwrap();
    assert!(Arc::ptr_eq(&registered, &email));
}

#[test]
fn email_alias_from_sync_declaration_site() {
    let email = build_alias(ValueType::String)
        .rule(keys::valid::string::IS_EMAIL)
        .factory(unregistered_factory())
        .apply("SyncEmail")
        .unwrap();
    assert!(email.construct(json!("x@y.org")).is_ok());
    assert!(matches!(
        email.construct(json!("nope")),
        Err(AssetError::ValidationFailed { .. })
    ));
}

#[tokio::test]
async fn advanced_enum_exposes_tagging_and_direct_metadata() {
    let status = build_enum()
        .variant("Active", "active")
        .variant("Retired", "retired")
        .tier(ProtocolTier::Advanced)
        .description("Lifecycle status")
        .factory(unregistered_factory())
        .apply_async("Status")
        .await
        .unwrap();

    assert!(status.has_member("get_tags"));
    assert!(status.has_member("add_tags"));
    assert_eq!(status.call("add_tags", &[json!("lifecycle")]).unwrap(), json!(1));
    assert_eq!(status.call("get_tags", &[]).unwrap(), json!(["lifecycle"]));

    let metadata = status.call("metadata", &[]).unwrap();
    assert_eq!(metadata["asset_type"], json!("enum"));
    assert_eq!(metadata["protocol_tier"], json!("advanced"));
    assert_eq!(metadata["description"], json!("Lifecycle status"));
    assert_eq!(status.tier(), ProtocolTier::Advanced);

    let active = status.member("Active").unwrap();
    assert_eq!(active.value(), &json!("active"));
    assert_eq!(status.variants().len(), 2);
}

#[tokio::test]
async fn registry_lifecycle() {
    let registry = TypeRegistry::named("end-to-end-lifecycle");
    let factory = unregistered_factory();
    let c = build_primitive(ValueType::String)
        .tags(["format/email", "pii"])
        .factory(factory.clone())
        .apply_async("C")
        .await
        .unwrap();
    let d = build_primitive(ValueType::String)
        .tags(["pii"])
        .factory(factory.clone())
        .apply_async("D")
        .await
        .unwrap();

    registry.register(c.clone(), Some("K"), None, None).await.unwrap();
    registry.register(c.clone(), Some("K"), None, None).await.unwrap();
    assert_eq!(registry.len().await, 1);
    assert!(matches!(
        registry.register(d.clone(), Some("K"), None, None).await,
        Err(AssetError::KeyConflict { .. })
    ));
    registry.register(d, None, None, None).await.unwrap();

    let both = registry.get_by_tags(&["format/email", "pii"], true).await;
    assert_eq!(both.keys().collect::<Vec<_>>(), vec!["K"]);
    let any = registry.get_by_tags(&["format/email", "pii"], false).await;
    assert_eq!(any.keys().collect::<Vec<_>>(), vec!["K", "D"]);

    let before = registry.stats().await;
    assert_eq!(before.by_asset_kind["primitive"], 2);
    registry.unregister("K").await.unwrap();
    let after = registry.stats().await;
    assert_eq!(after.total_types, before.total_types - 1);
    assert_eq!(registry.get_by_asset_type(AssetKind::Primitive).await.len(), 1);
}

#[tokio::test]
async fn tier_capability_lists_are_deduplicated() {
    let factory = unregistered_factory();
    for tier in ProtocolTier::ALL {
        let applied = factory.resolve_capabilities(tier, &asset_forge::OperationToggles::all(), true);
        for core in CapabilityName::CORE {
            assert_eq!(applied.iter().filter(|c| **c == core).count(), 1);
        }
        assert_eq!(applied.len(), CapabilityName::ALL.len());
        assert_eq!(applied.last(), Some(&CapabilityName::Caching));
    }
}

#[tokio::test]
async fn shell_member_masks_capability_member() {
    let shell = AssetShell::new("Loud").member("summary", |_call| Ok(json!("from shell")));
    let asset = build_enum()
        .factory(unregistered_factory())
        .apply_async(shell)
        .await
        .unwrap();
    assert_eq!(asset.call("summary", &[]).unwrap(), json!("from shell"));
}
