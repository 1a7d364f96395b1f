//! Inline reasoning span scanner
//!
//! Models answer/reasoning splitting as a pure transition function over
//! text chunks. Tags may straddle chunk boundaries: a trailing fragment that
//! could still grow into the awaited tag is carried into the next step
//! instead of being emitted.

use crate::config::ChatConfig;

/// Which stream the scanned text belongs to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScanMode {
    #[default]
    Answer,
    Reasoning,
}

/// Scanner state between chunks
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanState {
    pub mode: ScanMode,
    /// Possible start of the awaited tag, not yet emitted
    pub carry: String,
}

impl ScanState {
    pub fn is_reasoning(&self) -> bool {
        self.mode == ScanMode::Reasoning
    }
}

/// Output of one transition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Step {
    pub state: ScanState,
    pub answer: String,
    pub reasoning: String,
}

impl Step {
    fn emit(&mut self, mode: ScanMode, text: &str) {
        match mode {
            ScanMode::Answer => self.answer.push_str(text),
            ScanMode::Reasoning => self.reasoning.push_str(text),
        }
    }
}

/// Opening and closing delimiters of a reasoning span
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReasoningTags {
    pub open: String,
    pub close: String,
}

impl Default for ReasoningTags {
    fn default() -> Self {
        Self::from_config(&ChatConfig::default())
    }
}

impl ReasoningTags {
    pub fn from_config(config: &ChatConfig) -> Self {
        Self {
            open: config.reasoning_open_tag.clone(),
            close: config.reasoning_close_tag.clone(),
        }
    }

    fn awaited(&self, mode: ScanMode) -> &str {
        match mode {
            ScanMode::Answer => &self.open,
            ScanMode::Reasoning => &self.close,
        }
    }
}

/// Scan `chunk` starting from `state`.
pub fn step(tags: &ReasoningTags, state: ScanState, chunk: &str) -> Step {
    let ScanState { mut mode, carry } = state;
    let text = carry + chunk;
    let mut out = Step::default();
    let mut rest = text.as_str();

    loop {
        let tag = tags.awaited(mode);
        if let Some(pos) = rest.find(tag) {
            out.emit(mode, &rest[..pos]);
            rest = &rest[pos + tag.len()..];
            mode = match mode {
                ScanMode::Answer => ScanMode::Reasoning,
                ScanMode::Reasoning => ScanMode::Answer,
            };
            continue;
        }

        let held = partial_tag_suffix(rest, tag);
        out.emit(mode, &rest[..rest.len() - held]);
        out.state = ScanState {
            mode,
            carry: rest[rest.len() - held..].to_string(),
        };
        return out;
    }
}

/// Release the carry as literal text of the current mode.
pub fn finish(state: ScanState) -> Step {
    let mut out = Step::default();
    out.emit(state.mode, &state.carry);
    out.state = ScanState {
        mode: state.mode,
        carry: String::new(),
    };
    out
}

/// Length of the longest suffix of `text` that is a proper prefix of `tag`.
fn partial_tag_suffix(text: &str, tag: &str) -> usize {
    let max = tag.len().saturating_sub(1).min(text.len());
    (1..=max)
        .rev()
        .find(|&n| {
            let start = text.len() - n;
            text.is_char_boundary(start) && tag.starts_with(&text[start..])
        })
        .unwrap_or(0)
}
