//! End-to-end admission checks: validate, then generate an identifier.

use std::sync::Arc;

use proptest::prelude::*;

use nodekey_check::{CoreNodeType, Validator, Violation};
use nodekey_core::{IdGenerator, ParentRelationship, Properties, Taxonomy, TypeRegistry};

#[test]
fn every_core_type_is_registered_and_in_the_taxonomy() {
    let registry = TypeRegistry::standard();
    let taxonomy = Taxonomy::standard();
    for core_type in CoreNodeType::ALL {
        assert!(registry.is_registered(core_type.as_str()), "{}", core_type);
        assert!(taxonomy.is_known(core_type.as_str()), "{}", core_type);
    }
}

#[test]
fn every_child_type_requires_a_parent() {
    let validator = Validator::standard();
    for child in validator.taxonomy().child_types() {
        let violations = validator.check_node(&child, &Properties::new(), false);
        assert!(
            violations.iter().any(Violation::is_parent_required),
            "{} admitted without parent",
            child
        );
        let with_parent = validator.check_node(&child, &Properties::new(), true);
        assert!(!with_parent.iter().any(Violation::is_parent_required));
    }
}

#[test]
fn no_root_type_requires_a_parent() {
    let validator = Validator::standard();
    for root in validator.taxonomy().root_types() {
        let violations = validator.check_node(&root, &Properties::new(), false);
        assert!(!violations.iter().any(Violation::is_parent_required), "{}", root);
    }
}

#[test]
fn admit_host_port_service_chain() {
    let validator = Validator::standard();
    let generator = IdGenerator::standard();

    let host = Properties::new().with("ip", "192.168.1.10").with("hostname", "web01");
    validator.validate_node("host", &host, false).unwrap();
    let host_id = generator.generate("host", &host).unwrap();

    let port = Properties::new()
        .with("host_id", host_id.as_str())
        .with("number", 443)
        .with("protocol", "tcp");
    validator.validate_with_properties("port", &port).unwrap();
    let port_id = generator.generate("port", &port).unwrap();
    assert_eq!(port_id.node_type(), "port");

    let service = Properties::new()
        .with("port_id", port_id.as_str())
        .with("name", "https")
        .with("banner", "nginx/1.25");
    validator.validate_with_properties("service", &service).unwrap();
    let service_id = generator.generate("service", &service).unwrap();

    assert_ne!(host_id.token(), port_id.token());
    assert_ne!(port_id.token(), service_id.token());
}

#[test]
fn rejected_node_error_names_fields() {
    let validator = Validator::standard();
    let props = Properties::new()
        .with("title", "Open redirect")
        .with("cvss_score", 11.0);
    let err = validator.validate_node("finding", &props, false).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("cvss_score"));
    assert!(message.contains("must be between 0.0 and 10.0"));
}

#[test]
fn custom_taxonomy_drives_parent_checks() {
    // Extension taxonomies only matter for core type names they cover.
    let taxonomy = Taxonomy::new(
        ["host", "finding"],
        vec![ParentRelationship::new("evidence", "finding", "finding_id", "SUPPORTS")],
    )
    .unwrap();
    let validator = Validator::new(Arc::new(taxonomy));

    // No relationship covers port here, so no parent is needed.
    let port = Properties::new().with("number", 80).with("protocol", "tcp");
    assert!(validator.validate_node("port", &port, false).is_ok());

    let evidence = Properties::new().with("type", "screenshot");
    let err = validator.validate_node("evidence", &evidence, false).unwrap_err();
    match &err.violations[0] {
        Violation::ParentRequired { relationship, .. } => assert_eq!(relationship, "SUPPORTS"),
        other => panic!("expected ParentRequired, got {:?}", other),
    }
}

proptest! {
    #[test]
    fn port_numbers_follow_the_closed_interval(number in -70000i64..70000) {
        let validator = Validator::standard();
        let props = Properties::new().with("number", number).with("protocol", "tcp");
        let ok = validator.validate_node("port", &props, true).is_ok();
        prop_assert_eq!(ok, (1..=65535).contains(&number));
    }

    #[test]
    fn confidence_follows_the_closed_interval(confidence in -1.0f64..2.0) {
        let validator = Validator::standard();
        let props = Properties::new().with("title", "x").with("confidence", confidence);
        let ok = validator.validate_node("finding", &props, false).is_ok();
        prop_assert_eq!(ok, (0.0..=1.0).contains(&confidence));
    }

    #[test]
    fn extension_names_always_pass(name in "x_[a-z]{1,12}", has_parent in any::<bool>()) {
        let validator = Validator::standard();
        prop_assert!(validator.validate_node(&name, &Properties::new(), has_parent).is_ok());
    }
}
