use codebridge::component::{
    CoercionError, Element, InputParameter, JsxTransform, ParamType, Preview, RenderError,
    Transform, TransformCache,
};
use codebridge::runtime::{Snippet, SnippetTarget};
use serde_json::json;

const PROFILE_CARD: &str = r#"
import React, { useState } from 'react';

type Props = { name: string; age?: number; tags: string[]; theme: { accent: string } };

const Tag = ({ label }: { label: string }) => <span className="tag">{label}</span>;

export default function ProfileCard({ name, age = 30, tags = [], theme, verified }: Props) {
  const [expanded] = useState(false);
  const title = verified ? `${name} ✓` : name;
  return (
    <div className="card" style={{ borderColor: theme?.accent ?? 'gray' }}>
      <h2>{title}</h2>
      <p>Age: {age}</p>
      {tags.length > 0 && (
        <ul>
          {tags.map(tag => <li key={tag}><Tag label={tag} /></li>)}
        </ul>
      )}
      {expanded ? <p>details</p> : null}
    </div>
  );
}
"#;

fn params() -> Vec<InputParameter> {
    vec![
        InputParameter::new("name", ParamType::String, "'Ada'"),
        InputParameter::new("age", ParamType::Number, "36"),
        InputParameter::new("tags", ParamType::Array, r#"["math", "engines"]"#),
        InputParameter::new("theme", ParamType::Object, r##"{"accent": "#f00"}"##),
        InputParameter::new("verified", ParamType::Boolean, "true"),
    ]
}

#[test]
fn preview_renders_with_coerced_props() {
    let preview = Preview::build(&JsxTransform, PROFILE_CARD, None, &params()).unwrap();
    assert!(preview.errors().is_empty());
    assert_eq!(preview.props()["age"], json!(36));

    let html = preview.render().unwrap().to_html();
    assert_eq!(
        html,
        "<div class=\"card\" style=\"border-color:#f00\"><h2>Ada ✓</h2><p>Age: 36</p>\
         <ul><li><span class=\"tag\">math</span></li><li><span class=\"tag\">engines</span></li></ul></div>"
    );
}

#[test]
fn bad_parameter_is_skipped_and_default_applies() {
    let mut parameters = params();
    parameters[1] = InputParameter::new("age", ParamType::Number, "thirty");
    parameters[2] = InputParameter::new("tags", ParamType::Array, "{}");

    let preview = Preview::build(&JsxTransform, PROFILE_CARD, Some("ProfileCard"), &parameters)
        .unwrap();
    assert_eq!(
        preview.errors().get("age"),
        Some(&CoercionError::InvalidNumber("thirty".into()))
    );
    assert!(matches!(
        preview.errors().get("tags"),
        Some(CoercionError::ShapeMismatch { .. })
    ));

    let element = preview.render().unwrap();
    assert!(element.text().contains("Age: 30"));
    assert!(!element.to_html().contains("<ul>"));
}

#[test]
fn malformed_source_reports_transform_error() {
    let err = JsxTransform
        .transform("export default function Broken( {\n  return <div>\n}", None)
        .unwrap_err();
    assert!(!err.message.is_empty());
    assert!(err.location.is_some());
    assert!(!err.to_string().is_empty());
}

#[test]
fn named_export_selection() {
    let source = "export const Primary = () => <button>go</button>;\n\
                  export const Secondary = () => <button className=\"alt\">back</button>;";
    let factory = JsxTransform.transform(source, Some("Secondary")).unwrap();
    assert_eq!(factory.name(), "Secondary");
    assert_eq!(
        factory.render(&json!({})).unwrap(),
        Element::Tag {
            name: "button".into(),
            attributes: vec![("class".into(), "alt".into())],
            children: vec![Element::Text("back".into())],
        }
    );

    let err = JsxTransform.transform(source, None).unwrap_err();
    assert!(err.message.contains("Primary"));
}

#[test]
fn render_failures_surface_as_render_errors() {
    let factory = JsxTransform
        .transform("export default () => <Chart data={[1, 2]} />;", None)
        .unwrap();
    assert_eq!(
        factory.render(&json!({})),
        Err(RenderError::UnknownComponent("Chart".into()))
    );
}

#[test]
fn cached_transform_returns_equal_factories() {
    let cache = TransformCache::new(JsxTransform);
    let a = cache.transform(PROFILE_CARD, None).unwrap();
    let b = cache.transform(PROFILE_CARD, None).unwrap();
    assert_eq!(a.id(), b.id());
    assert_eq!(cache.len(), 1);

    let fresh = JsxTransform.transform(PROFILE_CARD, None).unwrap();
    assert_eq!(a, fresh);
}

#[test]
fn snippet_record_drives_preview() {
    let record = json!({
        "id": "snip-1",
        "title": "Greeting",
        "code": "export function Greeting({ who }) { return <p>Hello {who}</p>; }",
        "language": "jsx",
        "hasPreview": true,
        "functionName": "Greeting",
        "inputParameters": [{ "name": "who", "type": "string", "defaultValue": "\"world\"" }],
        "createdAt": 1_700_000_000_000_i64,
        "updatedAt": null
    });
    let snippet = Snippet::from_json(&record.to_string()).unwrap();

    let SnippetTarget::Preview {
        source,
        export_name,
        parameters,
    } = snippet.target()
    else {
        panic!("expected a preview target");
    };
    let preview = Preview::build(&JsxTransform, source, export_name, parameters).unwrap();
    assert_eq!(preview.render().unwrap().to_html(), "<p>Hello world</p>");
    assert!(snippet.updated().is_none());
}
