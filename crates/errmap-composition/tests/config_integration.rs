//! Configuration applied through the builder

use std::io::Write;
use std::sync::Arc;

use assert_matches::assert_matches;
use errmap_composition::ExceptionMapper;
use errmap_core::{ConfigError, Handling, MapperConfig, Outcome};

#[derive(Debug, thiserror::Error)]
#[error("argument error")]
struct ArgumentError;

fn config_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

fn builder_with_two_schemes() -> errmap_composition::ExceptionMapperBuilder {
    let mut builder = ExceptionMapper::builder();
    let primary = builder.add_convention_scheme("primary").unwrap();
    primary.map_all(|_| Outcome::returning("primary"));
    primary.map_all(|_| Outcome::handled()).set_order(1);
    builder
        .add_convention_scheme("secondary")
        .unwrap()
        .map_all(|_| Outcome::returning("secondary"));
    builder
}

#[tokio::test]
async fn disabled_scheme_is_excluded_from_dispatch() {
    let file = config_file(
        r#"
disabled_schemes = ["primary"]
"#,
    );
    let config = MapperConfig::load_from_file(file.path()).unwrap();

    let mut builder = builder_with_two_schemes();
    builder.apply_config(&config).unwrap();
    let mapper = builder.build().unwrap();

    assert!(mapper.is_disabled("primary"));
    let outcome = mapper.dispatch(Arc::new(ArgumentError)).await;
    assert_eq!(outcome.downcast_return::<&str>(), Some(&"secondary"));
    assert!(!mapper.handler_cache().is_cached("primary"));
}

#[tokio::test]
async fn return_values_can_be_refused_per_scheme() {
    let file = config_file(
        r#"
[schemes.primary]
accepts_return_values = false
"#,
    );
    let config = MapperConfig::load_from_file(file.path()).unwrap();

    let mut builder = builder_with_two_schemes();
    builder.apply_config(&config).unwrap();
    let mapper = builder.build().unwrap();

    // The Return convention is downgraded, the Handled one decides
    let outcome = mapper.dispatch(Arc::new(ArgumentError)).await;
    assert_eq!(outcome.handling(), Handling::Handled);
}

#[tokio::test]
async fn environment_disables_schemes() {
    let mut config = MapperConfig::default();
    config
        .merge_with_vars([("ERRMAP_DISABLED_SCHEMES", "primary,secondary")])
        .unwrap();

    let mut builder = builder_with_two_schemes();
    builder.apply_config(&config).unwrap();
    let mapper = builder.build().unwrap();

    let outcome = mapper.dispatch(Arc::new(ArgumentError)).await;
    assert_eq!(outcome.handling(), Handling::Rethrow);
}

#[test]
fn unknown_scheme_in_config_fails_build() {
    let file = config_file(
        r#"
[schemes.missing]
implicit_mapping = false
"#,
    );
    let config = MapperConfig::load_from_file(file.path()).unwrap();

    let mut builder = builder_with_two_schemes();
    builder.apply_config(&config).unwrap();
    assert_matches!(
        builder.build(),
        Err(ConfigError::UnknownScheme { name }) if name == "missing"
    );
}

#[test]
fn conflicting_config_is_rejected_on_merge() {
    let mut builder = builder_with_two_schemes();
    let file = config_file(
        r#"
[schemes.primary]
implicit_mapping = false
"#,
    );
    builder
        .apply_config(&MapperConfig::load_from_file(file.path()).unwrap())
        .unwrap();

    let mut disabling = MapperConfig::default();
    disabling.disable("primary");
    assert_matches!(
        builder.apply_config(&disabling).map(|_| ()),
        Err(ConfigError::InvalidConfig { .. })
    );

    // The rejected config was not merged
    let mapper = builder.build().unwrap();
    assert!(!mapper.is_disabled("primary"));
    assert!(!mapper.handler_cache().services().options("primary").implicit_mapping);
}
