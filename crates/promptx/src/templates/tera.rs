use ::tera::{Context, Tera};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::error::Error as StdError;
use std::fs;
use std::path::PathBuf;

use super::{RenderContext, Template, TemplateTag};
use crate::errors::TemplateError;

const TEMPLATE_NAME: &str = "inline_template";

const USAGE_HINT: &str = "Do not respond using markdown.
Respond only with the Tera template language, for example:
- Variables: \"the sheep is {{ color }}\"
- Functions: \"hello {{ get_username() }}\"

You can call the following functions, do not call functions outside this list:";

/// Instructions written in the Tera template language. Registered functions
/// are callable from the source as `{{ name(arg=value) }}`.
#[derive(Debug, Clone)]
pub struct TeraTemplate {
    src: String,
    context: Context,
}

impl TeraTemplate {
    pub fn new<S: Into<String>>(src: S) -> Self {
        Self {
            src: src.into(),
            context: Context::new(),
        }
    }

    /// Load the instructions from a file
    pub fn from_file(template_file: impl Into<PathBuf>) -> std::io::Result<Self> {
        let src = fs::read_to_string(template_file.into())?;
        Ok(Self::new(src))
    }

    /// Make `value` available to every render as the variable `key`
    pub fn with_var<T: Serialize + ?Sized>(mut self, key: &str, value: &T) -> Self {
        self.context.insert(key, value);
        self
    }

    fn compile(&self, src: &str, ctx: &RenderContext<'_>) -> Result<Tera, TemplateError> {
        let mut tera = Tera::default();
        tera.add_raw_template(TEMPLATE_NAME, src)
            .map_err(|e| TemplateError::Syntax(describe(&e)))?;

        if let Some(functions) = ctx.functions {
            for function in functions.iter() {
                let name = function.name().to_string();
                let function = function.clone();
                tera.register_function(
                    &name,
                    move |args: &HashMap<String, Value>| -> ::tera::Result<Value> {
                        let args: Map<String, Value> =
                            args.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                        Ok(function.invoke_blocking(Value::Object(args)))
                    },
                );
            }
        }

        Ok(tera)
    }
}

impl Template for TeraTemplate {
    fn tags(&self) -> &[TemplateTag] {
        &[TemplateTag::Functions]
    }

    fn render(&self, ctx: &RenderContext<'_>) -> Result<String, TemplateError> {
        let src = ctx.src.unwrap_or(&self.src);
        let tera = self.compile(src, ctx)?;
        tera.render(TEMPLATE_NAME, &self.context)
            .map_err(|e| TemplateError::Render(describe(&e)))
    }

    fn usage_hint(&self) -> Option<&str> {
        Some(USAGE_HINT)
    }
}

// tera puts the useful detail (line, column, expected token) in the source chain
fn describe(err: &::tera::Error) -> String {
    let mut msg = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        msg.push_str(": ");
        msg.push_str(&cause.to_string());
        source = cause.source();
    }
    msg
}
