//! Instruction documents returned to the telephony provider.

/// Instruction sent over an open media stream to end the call.
pub const HANGUP_TWIML: &str = "<Response><Hangup/></Response>";

#[derive(Debug, Clone, PartialEq)]
enum Verb {
    Say(String),
    Hangup,
    ConnectStream {
        url: String,
        parameters: Vec<(String, String)>,
    },
}

/// Builder for a `<Response>` instruction document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TwimlResponse {
    verbs: Vec<Verb>,
}

impl TwimlResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Speaks `text` to the caller.
    pub fn say(mut self, text: impl Into<String>) -> Self {
        self.verbs.push(Verb::Say(text.into()));
        self
    }

    pub fn hangup(mut self) -> Self {
        self.verbs.push(Verb::Hangup);
        self
    }

    /// Opens a bidirectional media stream to `url`, handing `parameters` to
    /// the stream's `start` event.
    pub fn connect_stream<K, V>(
        mut self,
        url: impl Into<String>,
        parameters: impl IntoIterator<Item = (K, V)>,
    ) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.verbs.push(Verb::ConnectStream {
            url: url.into(),
            parameters: parameters
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        });
        self
    }

    /// Renders the document with an XML declaration.
    pub fn render(&self) -> String {
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Response>\n");
        for verb in &self.verbs {
            match verb {
                Verb::Say(text) => {
                    out.push_str(&format!("  <Say>{}</Say>\n", escape_xml(text)));
                }
                Verb::Hangup => out.push_str("  <Hangup />\n"),
                Verb::ConnectStream { url, parameters } => {
                    out.push_str("  <Connect>\n");
                    out.push_str(&format!("    <Stream url=\"{}\">\n", escape_xml(url)));
                    for (name, value) in parameters {
                        out.push_str(&format!(
                            "      <Parameter name=\"{}\" value=\"{}\" />\n",
                            escape_xml(name),
                            escape_xml(value)
                        ));
                    }
                    out.push_str("    </Stream>\n");
                    out.push_str("  </Connect>\n");
                }
            }
        }
        out.push_str("</Response>");
        out
    }
}

fn escape_xml(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
