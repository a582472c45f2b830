use indexmap::IndexMap;
use serde::Serialize;

use crate::value::Value;

/// One activation on the call stack. Frame 0 is the top-level script and its
/// locals are the program's globals.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Frame {
    pub(crate) name: String,
    pub(crate) return_address: usize,
    pub(crate) locals: IndexMap<String, Value>,
    /// User line of the statement this frame is running; `None` inside library code.
    pub(crate) line: Option<usize>,
    /// Operand stack depth when the frame was entered.
    pub(crate) stack_base: usize,
}

impl Frame {
    pub(crate) fn main() -> Self {
        Self {
            name: "<main>".to_string(),
            return_address: 0,
            locals: IndexMap::new(),
            line: None,
            stack_base: 0,
        }
    }

    pub(crate) fn call(
        name: &str,
        return_address: usize,
        locals: IndexMap<String, Value>,
        line: Option<usize>,
        stack_base: usize,
    ) -> Self {
        Self {
            name: name.to_string(),
            return_address,
            locals,
            line,
            stack_base,
        }
    }
}

/// Read-only projection of a frame for debugger views.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameView {
    pub name: String,
    pub line: Option<usize>,
    pub locals: IndexMap<String, Value>,
}

/// Name resolution over a call stack: the innermost frame shadows globals.
pub(crate) fn lookup<'a>(frames: &'a [Frame], name: &str) -> Option<&'a Value> {
    let (innermost, _) = frames.split_last()?;
    innermost
        .locals
        .get(name)
        .or_else(|| frames.first().and_then(|globals| globals.locals.get(name)))
}

pub(crate) fn lookup_mut<'a>(frames: &'a mut [Frame], name: &str) -> Option<&'a mut Value> {
    let innermost = frames.len().checked_sub(1)?;
    let depth = if frames[innermost].locals.contains_key(name) {
        innermost
    } else {
        0
    };
    frames[depth].locals.get_mut(name)
}
