//! Message templates.
//!
//! Every notice is rendered in several formats (`short.txt`, `full.txt`,
//! `notice.html`, `full.html`, `sms.txt`). Each format is looked up first
//! under `notification/<label>/<format>` and then under
//! `notification/<format>`, so notice types only override what they need.
//!
//! `.txt` templates render without HTML escaping; everything else escapes.
//!
//! Template text is localized with `{{trans "msgid"}}`, which translates
//! into the context's `language_code`.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use handlebars::{
    Context as RenderData, Handlebars, Helper, HelperDef, RenderContext, RenderError,
    RenderErrorReason, ScopedJson,
};
use serde_json::Value;
use tracing::debug;

use super::language::{Catalog, Translator};
use crate::{Error, Result};

const TRANS_HELPER: &str = "trans";

/// Canonical formats rendered for every notice.
pub const DEFAULT_FORMATS: [&str; 5] = [
    "short.txt",
    "full.txt",
    "notice.html",
    "full.html",
    "sms.txt",
];

pub const EMAIL_SUBJECT_TEMPLATE: &str = "notification/email_subject.txt";
pub const EMAIL_BODY_TEMPLATE: &str = "notification/email_body.txt";

/// Escaping profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderProfile {
    Html,
    Text,
}

impl RenderProfile {
    pub fn for_name(name: &str) -> Self {
        if name.ends_with(".txt") {
            Self::Text
        } else {
            Self::Html
        }
    }
}

/// Template lookup and rendering.
pub trait TemplateEngine: Send + Sync {
    /// Render the first template in `names` that exists.
    fn render(&self, names: &[String], context: &Value, profile: RenderProfile) -> Result<String>;
}

/// `{{trans "msgid"}}`: the msgid in the rendering language.
///
/// The result goes through the registry's escape function like any other
/// expression.
struct TransHelper {
    translator: Arc<dyn Translator>,
}

impl HelperDef for TransHelper {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        data: &'rc RenderData,
        _: &mut RenderContext<'reg, 'rc>,
    ) -> std::result::Result<ScopedJson<'rc>, RenderError> {
        let msgid = h
            .param(0)
            .and_then(|p| p.value().as_str())
            .ok_or(RenderErrorReason::ParamNotFoundForIndex(TRANS_HELPER, 0))?;
        let language = data.data().get("language_code").and_then(Value::as_str);
        Ok(ScopedJson::Derived(Value::String(
            self.translator.translate(language, msgid),
        )))
    }
}

/// Handlebars-backed engine with one registry per escaping profile.
pub struct HandlebarsTemplateEngine {
    html: Handlebars<'static>,
    text: Handlebars<'static>,
}

impl Default for HandlebarsTemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlebarsTemplateEngine {
    pub fn new() -> Self {
        let html = Handlebars::new();
        let mut text = Handlebars::new();
        text.register_escape_fn(handlebars::no_escape);
        Self { html, text }.with_translator(Arc::new(Catalog::empty()))
    }

    /// Translator behind the `trans` helper. Without one, msgids render as-is.
    pub fn with_translator(mut self, translator: Arc<dyn Translator>) -> Self {
        for registry in [&mut self.html, &mut self.text] {
            registry.register_helper(
                TRANS_HELPER,
                Box::new(TransHelper {
                    translator: translator.clone(),
                }),
            );
        }
        self
    }

    /// Load every file below `dir`, named by its `/`-separated relative path.
    pub fn from_directory(dir: &Path) -> Result<Self> {
        let mut engine = Self::new();
        engine.load_directory(dir, dir)?;
        debug!(dir = %dir.display(), "Loaded notification templates");
        Ok(engine)
    }

    fn load_directory(&mut self, root: &Path, dir: &Path) -> Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                self.load_directory(root, &path)?;
                continue;
            }
            let Ok(relative) = path.strip_prefix(root) else {
                continue;
            };
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let source = std::fs::read_to_string(&path)?;
            self.register(&name, &source)?;
        }
        Ok(())
    }

    /// Register a template under `name` in both registries.
    pub fn register(&mut self, name: &str, source: &str) -> Result<()> {
        self.html
            .register_template_string(name, source)
            .map_err(|e| Error::template(format!("{name}: {e}")))?;
        self.text
            .register_template_string(name, source)
            .map_err(|e| Error::template(format!("{name}: {e}")))?;
        Ok(())
    }

    pub fn with_template(mut self, name: &str, source: &str) -> Result<Self> {
        self.register(name, source)?;
        Ok(self)
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.html.has_template(name)
    }
}

impl TemplateEngine for HandlebarsTemplateEngine {
    fn render(&self, names: &[String], context: &Value, profile: RenderProfile) -> Result<String> {
        let registry = match profile {
            RenderProfile::Html => &self.html,
            RenderProfile::Text => &self.text,
        };
        let name = names
            .iter()
            .find(|n| registry.has_template(n))
            .ok_or_else(|| Error::template(format!("no template found among {names:?}")))?;
        registry
            .render(name, context)
            .map_err(|e| Error::template(format!("{name}: {e}")))
    }
}

/// Rendered formats of one notice, keyed by format name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedMessages(BTreeMap<String, String>);

impl RenderedMessages {
    pub fn get(&self, format: &str) -> Option<&str> {
        self.0.get(format).map(String::as_str)
    }

    /// Like `get`, but a format that was not rendered is an error.
    pub fn require(&self, format: &str) -> Result<&str> {
        self.get(format)
            .ok_or_else(|| Error::template(format!("format '{format}' was not rendered")))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Renders the configured formats for a notice label.
#[derive(Clone)]
pub struct TemplateFormatter {
    engine: Arc<dyn TemplateEngine>,
    formats: Vec<String>,
}

impl TemplateFormatter {
    pub fn new(engine: Arc<dyn TemplateEngine>) -> Self {
        Self {
            engine,
            formats: DEFAULT_FORMATS.iter().map(|f| f.to_string()).collect(),
        }
    }

    pub fn with_formats(mut self, formats: Vec<String>) -> Self {
        self.formats = formats;
        self
    }

    pub fn formats(&self) -> &[String] {
        &self.formats
    }

    /// Render every configured format for `label`.
    pub fn render_all(&self, label: &str, context: &Value) -> Result<RenderedMessages> {
        let mut rendered = BTreeMap::new();
        for format in &self.formats {
            let names = [
                format!("notification/{label}/{format}"),
                format!("notification/{format}"),
            ];
            let output = self
                .engine
                .render(&names, context, RenderProfile::for_name(format))?;
            rendered.insert(format.clone(), output);
        }
        Ok(RenderedMessages(rendered))
    }

    /// Render a single named template.
    pub fn render_template(&self, name: &str, context: &Value) -> Result<String> {
        self.engine
            .render(&[name.to_string()], context, RenderProfile::for_name(name))
    }
}

/// Move `<style>` rules into `style` attributes for email clients.
pub fn inline_css(html: &str) -> Result<String> {
    css_inline::inline(html).map_err(|e| Error::template(format!("CSS inlining failed: {e}")))
}

/// Collapse a rendered subject onto one line by dropping every line break.
pub fn single_line(subject: &str) -> String {
    subject.chars().filter(|c| !is_line_break(*c)).collect()
}

fn is_line_break(c: char) -> bool {
    matches!(
        c,
        '\n' | '\r'
            | '\u{0b}'
            | '\u{0c}'
            | '\u{1c}'
            | '\u{1d}'
            | '\u{1e}'
            | '\u{85}'
            | '\u{2028}'
            | '\u{2029}'
    )
}
