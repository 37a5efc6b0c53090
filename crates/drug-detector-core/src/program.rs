//! Annotation programs: prompt text interleaved with constrained slots.
//!
//! A [`Program`] is an ordered list of [`Segment`]s. Text and role markers are
//! rendered verbatim into the prompt; `Gen` and `Select` segments are slots the
//! backend fills in while the program runs (see [`crate::backend::execute`]).

use serde::{Deserialize, Serialize};

/// Chat role of a prompt section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One piece of an annotation program.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    RoleStart(Role),
    RoleEnd(Role),
    Text(String),
    /// Free-text slot; generation halts at the first stop string (not included)
    Gen {
        name: String,
        stop: Vec<String>,
        max_tokens: usize,
    },
    /// Forced choice between literal options
    Select { name: String, options: Vec<String> },
}

/// Ordered list of segments with builder helpers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    segments: Vec<Segment>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append literal text. Adjacent text is merged.
    pub fn text(&mut self, text: impl AsRef<str>) -> &mut Self {
        let text = text.as_ref();
        if text.is_empty() {
            return self;
        }
        match self.segments.last_mut() {
            Some(Segment::Text(existing)) => existing.push_str(text),
            _ => self.segments.push(Segment::Text(text.to_string())),
        }
        self
    }

    pub fn role_start(&mut self, role: Role) -> &mut Self {
        self.segments.push(Segment::RoleStart(role));
        self
    }

    pub fn role_end(&mut self, role: Role) -> &mut Self {
        self.segments.push(Segment::RoleEnd(role));
        self
    }

    pub fn gen(&mut self, name: impl Into<String>, stop: &[&str], max_tokens: usize) -> &mut Self {
        self.segments.push(Segment::Gen {
            name: name.into(),
            stop: stop.iter().map(|s| s.to_string()).collect(),
            max_tokens,
        });
        self
    }

    pub fn select(&mut self, name: impl Into<String>, options: &[&str]) -> &mut Self {
        self.segments.push(Segment::Select {
            name: name.into(),
            options: options.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Names of all slots in program order.
    pub fn slot_names(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Gen { name, .. } | Segment::Select { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Render everything up to the first slot. Useful for logging the static prompt.
    pub fn render_prefix(&self, template: ChatTemplate) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::RoleStart(role) => out.push_str(&template.role_start(*role)),
                Segment::RoleEnd(role) => out.push_str(template.role_end(*role)),
                Segment::Text(text) => out.push_str(text),
                Segment::Gen { .. } | Segment::Select { .. } => break,
            }
        }
        out
    }
}

/// Chat markup used to render role sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatTemplate {
    /// Llama 3 instruct headers
    #[default]
    Llama3,
    /// `<|im_start|>` / `<|im_end|>`
    ChatMl,
    /// `<|system|>` ... `<|end|>` markers
    Plain,
}

impl ChatTemplate {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "llama3" | "llama-3" => Some(Self::Llama3),
            "chatml" => Some(Self::ChatMl),
            "plain" => Some(Self::Plain),
            _ => None,
        }
    }

    pub fn role_start(&self, role: Role) -> String {
        match self {
            ChatTemplate::Llama3 => {
                format!("<|start_header_id|>{}<|end_header_id|>\n\n", role.as_str())
            }
            ChatTemplate::ChatMl => format!("<|im_start|>{}\n", role.as_str()),
            ChatTemplate::Plain => format!("<|{}|>\n", role.as_str()),
        }
    }

    pub fn role_end(&self, _role: Role) -> &'static str {
        match self {
            ChatTemplate::Llama3 => "<|eot_id|>",
            ChatTemplate::ChatMl => "<|im_end|>\n",
            ChatTemplate::Plain => "\n<|end|>\n",
        }
    }
}
