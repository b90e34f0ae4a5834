#![allow(clippy::unwrap_used)]

use indexmap::IndexMap;

use templet::settings::{load_settings, save_settings};
use templet::template::{load_group_file, Value};
use templet::RenderSettings;

#[test]
fn renders_a_group_file_with_json_attributes() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("common.stg"),
        "row(cells) ::= \"| <cells; separator=\\\" | \\\"> |\"\n",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("table.stg"),
        "import \"common.stg\"\ntable(title, rows) ::= <<\n<title>\n<rows:row(); separator=\"\\n\">\n>>\n",
    )
    .unwrap();

    let group = load_group_file(dir.path().join("table.stg")).unwrap();
    let json: serde_json::Value = serde_json::json!({
        "title": "Scores",
        "rows": [["ann", 3], ["bob", 12]],
    });
    let fields = json.as_object().unwrap().clone();
    let attributes: IndexMap<String, Value> = fields.into_iter().map(|(k, v)| (k, Value::from(v))).collect();
    let out = group.render("table", &attributes, &RenderSettings::default()).unwrap();
    assert_eq!(out, "Scores\n| ann | 3 |\n| bob | 12 |");
}

#[test]
fn settings_file_controls_wrapping() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("conf").join("settings.json");
    save_settings(&path, &RenderSettings::default().with_line_width(10)).unwrap();
    let settings = load_settings(&path).unwrap();
    assert_eq!(settings.line_width, Some(10));

    std::fs::write(dir.path().join("w.stg"), "t(xs) ::= \"<xs; wrap, separator=\\\" \\\">\"\n").unwrap();
    let group = load_group_file(dir.path().join("w.stg")).unwrap();
    let mut t = group.instance_of("t").unwrap();
    t.add("xs", vec!["alpha", "beta", "gamma"]).unwrap();
    assert_eq!(t.render_with(&settings).unwrap(), "alpha beta \ngamma");
}
