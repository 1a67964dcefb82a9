use std::path::{Path, PathBuf};

use netdeploy_core::{Inventory, VariableValue, Variables};
use netdeploy_renderer::{RenderError, Renderer};
use rstest::rstest;
use tempfile::TempDir;

fn sample_templates() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../templates")
}

fn sample_inventory() -> Inventory {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../inventory/devices.yaml");
    Inventory::load_at(&path).expect("sample inventory")
}

fn dir_with(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().expect("tempdir");
    for (name, content) in files {
        std::fs::write(dir.path().join(name), content).expect("write template");
    }
    dir
}

fn vars(pairs: &[(&str, VariableValue)]) -> Variables {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

// ---------------------------------------------------------------------------
// Sample templates
// ---------------------------------------------------------------------------

#[test]
fn sample_templates_are_valid() {
    let renderer = Renderer::new(sample_templates()).expect("renderer");
    let all = renderer.validate_all().expect("validate_all");
    let names: Vec<&str> = all.keys().map(String::as_str).collect();
    assert_eq!(
        names,
        ["access_switch", "core_switch", "edge_router", "management_switch"]
    );
    for (name, validation) in &all {
        assert!(validation.valid, "{name}: {:?}", validation.errors);
        assert!(validation.size > 0);
    }
    let mgmt = &all["management_switch"];
    assert_eq!(
        mgmt.variables,
        ["gateway", "hostname", "management_ip", "mgmt_vlan", "prefix_len"]
    );
    assert_eq!(mgmt.optional_variables, ["banner", "ntp_server", "ssh_user"]);
}

#[test]
fn every_sample_device_renders_without_markers() {
    let inventory = sample_inventory();
    let renderer = Renderer::new(sample_templates()).expect("renderer");
    for device in &inventory.devices {
        let binding = inventory.binding(device);
        let config = renderer
            .render(&device.template, &binding)
            .unwrap_or_else(|e| panic!("{}: {e}", device.name));
        assert!(!config.contains("{{"), "{}: unresolved marker", device.name);
        assert!(!config.contains("{%"), "{}: unresolved marker", device.name);
        let hostname = binding["hostname"].clone();
        let VariableValue::String(hostname) = hostname else {
            panic!("hostname must be a string");
        };
        assert!(config.contains(&format!("sysname {hostname}")));
    }
}

#[test]
fn core_switch_uses_network_filters() {
    let inventory = sample_inventory();
    let renderer = Renderer::new(sample_templates()).expect("renderer");
    let device = inventory.device("core-sw-01").expect("core-sw-01");
    let config = renderer.render("core_switch", &inventory.binding(device)).unwrap();
    assert!(config.contains("ip address 192.168.10.11 255.255.255.0"));
    assert!(config.contains("network 192.168.10.0 0.0.0.255"));
    assert!(config.contains("vlan 20\n description Users"));
}

#[test]
fn rendering_is_deterministic() {
    let inventory = sample_inventory();
    let renderer = Renderer::new(sample_templates()).expect("renderer");
    let device = inventory.device("access-sw-01").expect("access-sw-01");
    let binding = inventory.binding(device);
    let first = renderer.render("access_switch", &binding).unwrap();
    renderer.reload();
    let second = renderer.render("access_switch", &binding).unwrap();
    assert_eq!(first.as_bytes(), second.as_bytes());
}

// ---------------------------------------------------------------------------
// Role mapping
// ---------------------------------------------------------------------------

#[rstest]
#[case("management", "management_switch")]
#[case("core", "core_switch")]
#[case("access", "access_switch")]
#[case("edge", "edge_router")]
#[case("router", "edge_router")]
fn generate_config_follows_role_mapping(#[case] role: &str, #[case] template: &str) {
    let file = format!("{template}.j2");
    let dir = dir_with(&[(file.as_str(), "{{ device_role }}:{{ hostname }}")]);
    let renderer = Renderer::new(dir.path()).unwrap();
    let out = renderer
        .generate_config(
            role,
            &vars(&[
                ("hostname", "X".into()),
                ("device_role", role.into()),
            ]),
        )
        .unwrap();
    assert_eq!(out, format!("{role}:X"));
}

#[test]
fn unknown_role_is_an_error() {
    let renderer = Renderer::new(sample_templates()).unwrap();
    let err = renderer.generate_config("firewall", &Variables::new()).unwrap_err();
    assert!(matches!(err, RenderError::UnknownRole(_)), "got {err}");
    assert!(err.to_string().contains("firewall"));
}

#[test]
fn role_mapping_can_be_overridden() {
    let dir = dir_with(&[("campus_core.tera", "custom {{ hostname }}")]);
    let renderer = Renderer::new(dir.path())
        .unwrap()
        .with_role_template(netdeploy_core::DeviceRole::Core, "campus_core");
    let out = renderer
        .generate_config("core", &vars(&[("hostname", "C1".into())]))
        .unwrap();
    assert_eq!(out, "custom C1");
}

// ---------------------------------------------------------------------------
// Strict undefined semantics and errors
// ---------------------------------------------------------------------------

#[test]
fn missing_root_variable_is_named() {
    let dir = dir_with(&[(
        "mgmt.j2",
        "sysname {{ hostname }}\nip address {{ management_ip }}\n",
    )]);
    let renderer = Renderer::new(dir.path()).unwrap();
    let err = renderer
        .render("mgmt", &vars(&[("hostname", "SW1".into())]))
        .unwrap_err();
    match err {
        RenderError::UndefinedVariable { template, name } => {
            assert_eq!(template, "mgmt");
            assert_eq!(name, "management_ip");
        }
        other => panic!("expected UndefinedVariable, got {other}"),
    }
}

#[test]
fn missing_nested_attribute_is_named() {
    let dir = dir_with(&[("t.j2", "area {{ ospf.area }}")]);
    let renderer = Renderer::new(dir.path()).unwrap();
    let mut ospf = Variables::new();
    ospf.insert("process_id".into(), 1i64.into());
    let err = renderer
        .render("t", &vars(&[("ospf", ospf.into())]))
        .unwrap_err();
    match err {
        RenderError::UndefinedVariable { name, .. } => assert_eq!(name, "ospf.area"),
        other => panic!("expected UndefinedVariable, got {other}"),
    }
}

#[test]
fn guarded_sections_render_without_the_variable() {
    let dir = dir_with(&[(
        "t.j2",
        "{% if snmp is defined %}snmp {{ snmp }}\n{% endif %}user {{ user | default(value=\"admin\") }}",
    )]);
    let renderer = Renderer::new(dir.path()).unwrap();
    assert_eq!(renderer.render("t", &Variables::new()).unwrap(), "user admin");
}

#[test]
fn syntax_errors_are_reported_not_raised_by_validate() {
    let dir = dir_with(&[("broken.j2", "sysname {{ hostname \n{% if %}")]);
    let renderer = Renderer::new(dir.path()).unwrap();

    let validation = renderer.validate("broken").expect("validate never fails on content");
    assert!(!validation.valid);
    assert!(!validation.errors.is_empty());
    assert!(validation.errors[0].contains("broken"), "{:?}", validation.errors);

    let err = renderer
        .render("broken", &vars(&[("hostname", "X".into())]))
        .unwrap_err();
    assert!(matches!(err, RenderError::Syntax { .. }), "got {err}");
}

#[test]
fn missing_template_is_not_found() {
    let dir = dir_with(&[]);
    let renderer = Renderer::new(dir.path()).unwrap();
    assert!(matches!(
        renderer.validate("nope"),
        Err(RenderError::TemplateNotFound { .. })
    ));
    assert!(matches!(
        renderer.render("nope", &Variables::new()),
        Err(RenderError::TemplateNotFound { .. })
    ));
}

#[test]
fn bad_filter_input_is_a_render_error() {
    let dir = dir_with(&[("t.j2", "{{ prefix | subnet_mask }}")]);
    let renderer = Renderer::new(dir.path()).unwrap();
    let err = renderer
        .render("t", &vars(&[("prefix", 40i64.into())]))
        .unwrap_err();
    assert!(matches!(err, RenderError::Tera(_)));
    assert!(err.to_string().contains("between 0 and 32"), "got {err}");
}

#[test]
fn info_reports_file_metadata() {
    let renderer = Renderer::new(sample_templates()).unwrap();
    let info = renderer.info("edge_router.j2").unwrap();
    assert_eq!(info.name, "edge_router");
    assert!(info.path.ends_with("edge_router.j2"));
    assert_eq!(info.size, std::fs::metadata(&info.path).unwrap().len());
    assert!(info.modified.is_some());
    assert!(info.validation.valid);
    assert_eq!(info.validation.optional_variables, ["nat"]);
}
