//! `{{namespace.path}}` placeholder interpolation.
//!
//! Templates are rendered with `handlebars`, but no data is handed to the
//! renderer: every placeholder misses and lands in a `helperMissing` hook
//! that resolves it through [`ExecutionContext::lookup`], the same resolver
//! `context_variable` rules use. Unresolvable placeholders render as the
//! empty string. A template that does not parse is returned as written.

use crate::context::ExecutionContext;
use crate::value::as_text;
use handlebars::{Context, Handlebars, Helper, HelperDef, HelperResult, Output, RenderContext};
use serde_json::{Map, Value as JsonValue};
use tracing::debug;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Writes the text of a placeholder resolved against the context.
struct Lookup<'a>(&'a ExecutionContext);

impl HelperDef for Lookup<'_> {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        _: &'rc Context,
        _: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        let value = self.0.lookup(h.name());
        if let Some(text) = value.as_deref().and_then(as_text) {
            out.write(&text)?;
        }
        Ok(())
    }
}

/// Replaces every placeholder in `template` with its resolved text.
#[must_use]
pub fn interpolate(template: &str, ctx: &ExecutionContext) -> String {
    if !has_placeholders(template) {
        return template.to_owned();
    }

    let mut hbs = Handlebars::new();
    hbs.register_escape_fn(handlebars::no_escape);
    hbs.register_helper("helperMissing", Box::new(Lookup(ctx)));
    match hbs.render_template(template, &JsonValue::Object(Map::new())) {
        Ok(text) => text,
        Err(error) => {
            debug!(%error, "template left unrendered");
            template.to_owned()
        }
    }
}

/// Returns true if the template contains at least one placeholder.
#[must_use]
pub fn has_placeholders(template: &str) -> bool {
    template
        .find(OPEN)
        .is_some_and(|start| template[start + OPEN.len()..].contains(CLOSE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap())
            .with_contact(json!({ "name": "Dana" }))
            .with_variable("order", json!({ "id": 991 }))
            .with_variable("reminder_at", json!("2024-05-02T10:00:00Z"))
    }

    #[test]
    fn replaces_placeholders() {
        let text = interpolate(
            "Hi {{contact.name}}, order #{{ context.order.id }} shipped",
            &ctx(),
        );
        assert_eq!(text, "Hi Dana, order #991 shipped");
    }

    #[test]
    fn whole_template_reference() {
        assert_eq!(
            interpolate("{{context.reminder_at}}", &ctx()),
            "2024-05-02T10:00:00Z"
        );
    }

    #[test]
    fn missing_values_render_empty() {
        assert_eq!(interpolate("[{{context.nothing}}]", &ctx()), "[]");
        assert_eq!(interpolate("[{{bogus}}]", &ctx()), "[]");
    }

    #[test]
    fn values_render_unescaped() {
        let ctx = ctx()
            .with_contact(json!({ "name": "Tom & <Jerry>" }))
            .with_message("yes");
        assert_eq!(
            interpolate("{{contact.name}} said {{last_user_message}}", &ctx),
            "Tom & <Jerry> said yes"
        );
        assert_eq!(interpolate("{{context.order}}", &ctx), r#"{"id":991}"#);
        assert_eq!(interpolate("{{now}}", &ctx), "2024-05-01T09:30:00+00:00");
    }

    #[test]
    fn unparsable_template_is_kept() {
        assert_eq!(
            interpolate("Hi {{contact.name}} {{#if}}", &ctx()),
            "Hi {{contact.name}} {{#if}}"
        );
    }

    #[test]
    fn unterminated_placeholder_is_kept() {
        assert_eq!(interpolate("Hi {{contact.name", &ctx()), "Hi {{contact.name");
    }

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(interpolate("no placeholders", &ctx()), "no placeholders");
        assert!(!has_placeholders("no placeholders"));
        assert!(has_placeholders("a {{context.x}} b"));
        assert!(!has_placeholders("a {{ b"));
    }
}
