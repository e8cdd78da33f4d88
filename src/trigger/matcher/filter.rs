//! jq filter compilation and evaluation.
//!
//! Compiled filters hold reference-counted values and are not `Send`; they
//! are only ever touched from the matcher thread.

use jaq_interpret::{Ctx, Filter, FilterT, ParseCtx, RcIter, Val};
use serde_json::Value;

/// Compiles jq expressions against the core and standard libraries.
pub(super) struct FilterCompiler {
    ctx: ParseCtx,
}

impl FilterCompiler {
    pub(super) fn new() -> Self {
        let mut ctx = ParseCtx::new(Vec::new());
        ctx.insert_natives(jaq_core::core());
        ctx.insert_defs(jaq_std::std());
        Self { ctx }
    }

    pub(super) fn compile(&mut self, expression: &str) -> Result<Filter, String> {
        let (main, parse_errors) = jaq_parse::parse(expression, jaq_parse::main());
        if !parse_errors.is_empty() {
            let details: Vec<String> = parse_errors.iter().map(|err| format!("{err:?}")).collect();
            return Err(format!("syntax error: {}", details.join(", ")));
        }
        let Some(parsed) = main else {
            return Err("empty expression".to_owned());
        };

        let filter = self.ctx.compile(parsed);
        let compile_errors = std::mem::take(&mut self.ctx.errs);
        if !compile_errors.is_empty() {
            return Err(format!("{} undefined symbol(s)", compile_errors.len()));
        }
        Ok(filter)
    }
}

/// First output of a filter, reduced to what matching needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum FirstOutput {
    /// The filter produced nothing.
    Nothing,
    /// The filter produced `null`.
    Null,
    /// The filter produced `false`.
    False,
    /// The filter produced `true`.
    True,
    /// The filter produced any other value, rendered as text.
    Other(String),
}

impl FirstOutput {
    /// Returns `true` when the output lets a filter pass.
    pub(super) const fn passes(&self) -> bool {
        matches!(self, Self::True | Self::Other(_))
    }

    /// Returns the output as run-data text, or `None` when there is none.
    pub(super) fn into_text(self) -> Option<String> {
        match self {
            Self::Nothing | Self::Null => None,
            Self::False => Some("false".to_owned()),
            Self::True => Some("true".to_owned()),
            Self::Other(text) => Some(text),
        }
    }
}

/// Runs `filter` on `payload` and reduces its first output.
///
/// An evaluation error is reported as `Err` with the interpreter's message.
pub(super) fn first_output(filter: &Filter, payload: &Value) -> Result<FirstOutput, String> {
    let inputs = RcIter::new(core::iter::empty());
    let mut outputs = filter.run((Ctx::new([], &inputs), Val::from(payload.clone())));
    let Some(first) = outputs.next() else {
        return Ok(FirstOutput::Nothing);
    };
    match first.map_err(|err| err.to_string())? {
        Val::Null => Ok(FirstOutput::Null),
        Val::Bool(false) => Ok(FirstOutput::False),
        Val::Bool(true) => Ok(FirstOutput::True),
        Val::Str(text) => Ok(FirstOutput::Other(text.to_string())),
        other => Ok(FirstOutput::Other(other.to_string())),
    }
}
