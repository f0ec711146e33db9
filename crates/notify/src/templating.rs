//! Minijinja rendering of mail template variables.
//!
//! The mail gateway renders production emails from its own stored
//! templates. This renderer produces the same HTML locally for previews
//! and for checking custom templates against [`MailVars`].
//!
//! Templates are arbitrary strings (not pre-registered), so a fresh
//! [`minijinja::Environment`] is created per render call.

use minijinja::AutoEscape;

use crate::mail::MailVars;
use crate::traits::SendError;

/// Built-in template mirroring the gateway's alert layout.
pub const DEFAULT_TEMPLATE: &str = r#"<html>
<body>
<h2>{{ trigger_state }} {{ name }} {{ tags }}</h2>
{% if is_test %}<p>This is a test notification.</p>
{% endif %}{% if throttled %}<p>Too many events for this trigger, some notifications were suppressed.</p>
{% endif %}{% if desc_provided %}<div class="description">{{ desc | safe }}</div>
{% endif %}<table>
{% for row in rows %}<tr><td>{{ row.timestamp }}</td><td>{{ row.metric }}</td><td>{{ row.value }}</td><td>{{ row.oldstate }} &rarr; {{ row.state }}</td></tr>
{% endfor %}</table>
{% if plot_cids_provided %}{% for cid in plot_cids %}<img src="{{ cid | cid }}" alt="Trigger plot">
{% endfor %}{% endif %}<a href="{{ link }}">Open trigger</a>
</body>
</html>
"#;

/// Renders mail templates using minijinja.
#[derive(Debug)]
pub struct TemplateRenderer {
    _private: (),
}

impl TemplateRenderer {
    /// Create a new template renderer.
    pub fn new() -> Self {
        Self { _private: () }
    }

    /// Build a configured minijinja environment with custom filters.
    fn build_env() -> minijinja::Environment<'static> {
        let mut env = minijinja::Environment::new();

        // Every value is user data except `desc`, which is escaped upstream.
        env.set_auto_escape_callback(|_| AutoEscape::Html);
        env.add_filter("cid", cid_filter);

        env
    }

    /// Render a template string with the given mail variables.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Template`] if the template is invalid or
    /// rendering fails.
    pub fn render(&self, template_str: &str, vars: &MailVars) -> Result<String, SendError> {
        let env = Self::build_env();
        env.render_str(template_str, vars)
            .map_err(|e| SendError::Template(e.to_string()))
    }

    /// Render [`DEFAULT_TEMPLATE`].
    pub fn render_default(&self, vars: &MailVars) -> Result<String, SendError> {
        self.render(DEFAULT_TEMPLATE, vars)
    }

    /// Validate that a template string parses without errors.
    pub fn validate(&self, template_str: &str) -> Result<(), SendError> {
        let env = Self::build_env();
        env.template_from_str(template_str)
            .map_err(|e| SendError::Template(e.to_string()))?;
        Ok(())
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Custom filter: turn a content-id into a `cid:` reference.
fn cid_filter(value: String) -> String {
    format!("cid:{value}")
}
