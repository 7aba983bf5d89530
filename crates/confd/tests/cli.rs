use assert_cmd::Command;

#[test]
fn onetime_renders_a_file_backed_resource() {
    let conf_dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(conf_dir.path().join("conf.d")).unwrap();
    std::fs::create_dir_all(conf_dir.path().join("templates")).unwrap();
    std::fs::write(conf_dir.path().join("templates/app.conf.tmpl"), "greeting = {{ getv(key=\"/greeting\") }}").unwrap();

    let backend_file = conf_dir.path().join("backend.json");
    std::fs::write(&backend_file, r#"{"greeting": "hello"}"#).unwrap();

    let dest_dir = tempfile::tempdir().unwrap();
    let dest = dest_dir.path().join("app.conf");

    std::fs::write(
        conf_dir.path().join("conf.d/app.toml"),
        format!(
            "[template]\nsrc = \"app.conf.tmpl\"\ndest = \"{}\"\nkeys = [\"greeting\"]\n\n[backend]\nbackend = \"file\"\nnodes = [\"{}\"]\n",
            dest.display(),
            backend_file.display()
        ),
    )
    .unwrap();

    Command::cargo_bin("confd")
        .unwrap()
        .arg("--conf-dir")
        .arg(conf_dir.path())
        .arg("onetime")
        .assert()
        .success();

    assert_eq!(std::fs::read_to_string(&dest).unwrap(), "greeting = hello");
}

#[test]
fn validate_rejects_unknown_output_format() {
    let conf_dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(conf_dir.path().join("conf.d")).unwrap();
    std::fs::create_dir_all(conf_dir.path().join("templates")).unwrap();
    std::fs::write(conf_dir.path().join("templates/app.tmpl"), "anything").unwrap();

    let dest_dir = tempfile::tempdir().unwrap();
    std::fs::write(
        conf_dir.path().join("conf.d/app.toml"),
        format!(
            "[template]\nsrc = \"app.tmpl\"\ndest = \"{}/app.conf\"\nkeys = [\"a\"]\noutput_format = \"protobuf\"\n",
            dest_dir.path().display()
        ),
    )
    .unwrap();

    Command::cargo_bin("confd")
        .unwrap()
        .arg("--conf-dir")
        .arg(conf_dir.path())
        .arg("validate")
        .assert()
        .failure();
}
