//! # Output Types
//!
//! Serializable reports printed by the CLI, in JSON mode or as text.

use annodigest_core::{
    AnnotationDatum, AnnotationsDigest, RawRecord, Retention, Shape, TruncatedAncestor, TypeName,
    Value, View, ViewValue, WalkMode,
};
use serde::Serialize;
use std::collections::BTreeMap;

// =============================================================================
// VALUES
// =============================================================================

/// JSON rendering of a stored annotation value.
///
/// Enums become `"Type.CONSTANT"`, class literals keep their descriptor,
/// nested annotations become objects carrying an `@type` key.
#[must_use]
pub fn value_json(value: &Value) -> serde_json::Value {
    use serde_json::Value as Json;
    match value {
        Value::Absent => Json::Null,
        Value::Byte(v) => Json::from(*v),
        Value::Char(v) => match char::from_u32(u32::from(*v)) {
            Some(c) => Json::from(c.to_string()),
            None => Json::from(*v),
        },
        Value::Short(v) => Json::from(*v),
        Value::Int(v) => Json::from(*v),
        Value::Long(v) => Json::from(*v),
        Value::Float(v) => Json::from(f64::from(*v)),
        Value::Double(v) => Json::from(*v),
        Value::Boolean(v) => Json::from(*v),
        Value::String(v) | Value::Class(v) => Json::from(v.clone()),
        Value::Enum {
            type_name,
            constant,
        } => Json::from(format!("{}.{}", type_name.dotted(), constant)),
        Value::Annotation(nested) => {
            let mut object = serde_json::Map::new();
            object.insert("@type".to_string(), Json::from(nested.type_name.dotted()));
            for (name, v) in &nested.attributes {
                object.insert(name.clone(), value_json(v));
            }
            Json::Object(object)
        }
        Value::Array(items) => Json::Array(items.iter().map(value_json).collect()),
    }
}

/// JSON rendering of a resolved view value.
#[must_use]
pub fn view_value_json(value: &ViewValue) -> serde_json::Value {
    match value {
        ViewValue::Scalar(v) => value_json(v),
        ViewValue::Nested(view) => serde_json::Value::Object(
            ViewReport::accessors(view)
                .into_iter()
                .map(|(name, resolved)| (name, resolved.into_json()))
                .collect(),
        ),
        ViewValue::Array(items) => {
            serde_json::Value::Array(items.iter().map(view_value_json).collect())
        }
    }
}

// =============================================================================
// RECORDS
// =============================================================================

/// One annotation occurrence.
#[derive(Debug, Clone, Serialize)]
pub struct RecordReport {
    pub element: String,
    pub kind: String,
    pub annotation: String,
    pub retention: &'static str,
    pub attributes: serde_json::Map<String, serde_json::Value>,
    #[serde(skip)]
    pub display: String,
}

impl RecordReport {
    #[must_use]
    pub fn from_record(record: &RawRecord) -> Self {
        Self {
            element: record.element.to_string(),
            kind: record.element.kind.to_string(),
            annotation: record.annotation.type_name.dotted(),
            retention: match record.retention {
                Retention::Visible => "visible",
                Retention::Invisible => "invisible",
            },
            attributes: record
                .annotation
                .attributes
                .iter()
                .map(|(name, value)| (name.clone(), value_json(value)))
                .collect(),
            display: record.annotation.to_string(),
        }
    }
}

// =============================================================================
// DIGEST
// =============================================================================

/// A full digest, grouped the way it is queried.
#[derive(Debug, Clone, Serialize)]
pub struct DigestReport {
    pub root: String,
    pub mode: String,
    pub visited: Vec<String>,
    pub truncated: Vec<TruncatedAncestor>,
    pub class_data: Vec<RecordReport>,
    pub method_data: BTreeMap<String, Vec<RecordReport>>,
    pub field_data: BTreeMap<String, Vec<RecordReport>>,
}

impl DigestReport {
    #[must_use]
    pub fn from_digest(digest: &AnnotationsDigest) -> Self {
        let group = |(type_name, data): (&TypeName, &[AnnotationDatum])| {
            let records = data
                .iter()
                .map(|d| RecordReport::from_record(d.record()))
                .collect::<Vec<_>>();
            (type_name.dotted(), records)
        };
        Self {
            root: digest.root().dotted(),
            mode: match digest.mode() {
                WalkMode::Full => "full".to_string(),
                WalkMode::DirectOnly => "direct_only".to_string(),
            },
            visited: digest.visited().iter().map(|t| t.dotted()).collect(),
            truncated: digest.truncated().to_vec(),
            class_data: digest
                .class_iter()
                .map(|d| RecordReport::from_record(d.record()))
                .collect(),
            method_data: digest.methods().map(group).collect(),
            field_data: digest.fields().map(group).collect(),
        }
    }

    /// Total number of data in the report.
    #[must_use]
    pub fn len(&self) -> usize {
        let members: usize = self
            .method_data
            .values()
            .chain(self.field_data.values())
            .map(Vec::len)
            .sum();
        self.class_data.len() + members
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Human-readable rendering.
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Digest of {} ({})\n", self.root, self.mode));
        out.push_str("==========\n\n");
        out.push_str(&format!("Visited: {}\n", self.visited.join(" -> ")));
        for t in &self.truncated {
            out.push_str(&format!(
                "Truncated: {} (referenced by {})\n",
                t.ancestor.dotted(),
                t.referenced_by.dotted()
            ));
        }

        out.push_str("\nClass annotations:\n");
        for record in &self.class_data {
            out.push_str(&format!("  {}  [{}]\n", record.display, record.element));
        }
        for (title, groups) in [("Method", &self.method_data), ("Field", &self.field_data)] {
            out.push_str(&format!("\n{title} annotations:\n"));
            for records in groups.values() {
                for record in records {
                    out.push_str(&format!("  {}  [{}]\n", record.display, record.element));
                }
            }
        }
        out
    }
}

// =============================================================================
// SHAPES & VIEWS
// =============================================================================

/// One accessor of a derived shape.
#[derive(Debug, Clone, Serialize)]
pub struct AccessorReport {
    pub name: String,
    pub kind: String,
    pub default: Option<serde_json::Value>,
}

/// A derived annotation shape.
#[derive(Debug, Clone, Serialize)]
pub struct ShapeReport {
    pub annotation: String,
    pub accessors: Vec<AccessorReport>,
}

impl ShapeReport {
    #[must_use]
    pub fn from_shape(shape: &Shape) -> Self {
        Self {
            annotation: shape.annotation_type().dotted(),
            accessors: shape
                .accessors()
                .map(|a| AccessorReport {
                    name: a.name.clone(),
                    kind: a.kind.to_string(),
                    default: a.default.as_ref().map(value_json),
                })
                .collect(),
        }
    }

    #[must_use]
    pub fn to_text(&self) -> String {
        let mut out = format!("@{}\n==========\n", self.annotation);
        for accessor in &self.accessors {
            match &accessor.default {
                Some(default) => out.push_str(&format!(
                    "  {} {}() default {}\n",
                    accessor.kind, accessor.name, default
                )),
                None => out.push_str(&format!("  {} {}()\n", accessor.kind, accessor.name)),
            }
        }
        out
    }
}

/// Outcome of one accessor call. Errors stay local to the accessor.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolved {
    Value(serde_json::Value),
    Error(String),
}

impl Resolved {
    fn into_json(self) -> serde_json::Value {
        match self {
            Self::Value(v) => v,
            Self::Error(e) => serde_json::json!({ "error": e }),
        }
    }
}

/// Every accessor of one view, resolved.
#[derive(Debug, Clone, Serialize)]
pub struct ViewReport {
    pub element: String,
    pub annotation: String,
    pub values: Vec<(String, Resolved)>,
}

impl ViewReport {
    #[must_use]
    pub fn new(element: String, view: &View) -> Self {
        Self {
            element,
            annotation: view.shape().annotation_type().dotted(),
            values: Self::accessors(view),
        }
    }

    fn accessors(view: &View) -> Vec<(String, Resolved)> {
        view.shape()
            .accessors()
            .map(|a| {
                let resolved = match view.get(&a.name) {
                    Ok(v) => Resolved::Value(view_value_json(&v)),
                    Err(e) => Resolved::Error(e.to_string()),
                };
                (a.name.clone(), resolved)
            })
            .collect()
    }

    /// Accessor names whose resolution failed.
    #[must_use]
    pub fn errors(&self) -> Vec<&str> {
        self.values
            .iter()
            .filter(|(_, r)| matches!(r, Resolved::Error(_)))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    #[must_use]
    pub fn to_text(&self) -> String {
        let mut out = format!("@{} on {}\n", self.annotation, self.element);
        for (name, resolved) in &self.values {
            match resolved {
                Resolved::Value(v) => out.push_str(&format!("  {name} = {v}\n")),
                Resolved::Error(e) => out.push_str(&format!("  {name} ! {e}\n")),
            }
        }
        out
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use annodigest_core::{Annotation, ValueKind};

    #[test]
    fn values_render_as_json() {
        let value = Value::Array(vec![
            Value::Int(3),
            Value::enum_constant("a/Mode", "FAST"),
            Value::Annotation(Annotation::new("a/Inner").with("x", Value::Boolean(true))),
        ]);
        assert_eq!(
            value_json(&value),
            serde_json::json!([3, "a.Mode.FAST", { "@type": "a.Inner", "x": true }])
        );
        assert_eq!(value_json(&Value::Char(u16::from(b'q'))), "q");
    }

    #[test]
    fn view_report_keeps_errors_local() {
        let shape = Shape::new("a/Route")
            .accessor("path", ValueKind::String)
            .accessor("verbs", ValueKind::array_of(ValueKind::String))
            .accessor("weight", ValueKind::Int);
        let annotation = Annotation::new("a/Route")
            .with("path", Value::Array(vec![Value::string("/x")]))
            .with("verbs", Value::string("GET"));
        let report = ViewReport::new("a/Api".to_string(), &View::of(annotation, shape));

        assert!(matches!(&report.values[0].1, Resolved::Value(v) if v == "/x"));
        assert_eq!(report.errors(), vec!["verbs", "weight"]);
        assert!(report.to_text().contains("path = \"/x\""));
    }

    #[test]
    fn shape_report_lists_defaults() {
        let shape = Shape::new("a/Route")
            .accessor("path", ValueKind::String)
            .accessor_with_default("order", ValueKind::Int, Value::Int(0));
        let report = ShapeReport::from_shape(&shape);
        assert_eq!(report.annotation, "a.Route");
        assert_eq!(report.accessors[0].name, "order");
        assert_eq!(report.accessors[0].default, Some(serde_json::json!(0)));
        assert!(report.to_text().contains("int order() default 0"));
    }
}
