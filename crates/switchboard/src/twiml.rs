//! TwiML (Twilio Markup Language) builder for voice and message responses
//!
//! Creates the XML documents Twilio consumes to control phone calls and
//! messaging replies.

use std::fmt::Write;

/// Builder for generating TwiML responses
#[derive(Debug, Clone, Default)]
pub struct TwimlBuilder {
    elements: Vec<TwimlElement>,
}

/// TwiML elements
#[derive(Debug, Clone)]
enum TwimlElement {
    Say {
        text: String,
        voice: String,
        language: String,
    },
    Gather {
        action: String,
        method: String,
        timeout: u32,
        speech_timeout: String,
        speech_model: String,
        language: String,
        children: Vec<TwimlElement>,
    },
    Play {
        url: String,
        loop_count: u32,
    },
    Pause {
        length: u32,
    },
    Redirect {
        url: String,
        method: String,
    },
    Message {
        text: String,
    },
    Hangup,
}

impl TwimlBuilder {
    /// Create a new TwiML builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a Say element (Twilio built-in text-to-speech)
    pub fn say(mut self, text: &str, voice: &str, language: &str) -> Self {
        self.elements.push(TwimlElement::Say {
            text: xml_escape(text),
            voice: voice.to_string(),
            language: language.to_string(),
        });
        self
    }

    /// Add a speech Gather whose prompt is a Say element
    pub fn gather_speech(
        mut self,
        action: &str,
        timeout: u32,
        language: &str,
        prompt: Option<(&str, &str)>,
    ) -> Self {
        let mut children = Vec::new();
        if let Some((text, voice)) = prompt {
            children.push(TwimlElement::Say {
                text: xml_escape(text),
                voice: voice.to_string(),
                language: language.to_string(),
            });
        }

        self.elements.push(TwimlElement::Gather {
            action: action.to_string(),
            method: "POST".to_string(),
            timeout,
            speech_timeout: "auto".to_string(),
            speech_model: "phone_call".to_string(),
            language: language.to_string(),
            children,
        });
        self
    }

    /// Add a speech Gather whose prompt is pre-synthesized audio
    pub fn gather_speech_with_audio(
        mut self,
        audio_url: &str,
        action: &str,
        timeout: u32,
        language: &str,
    ) -> Self {
        let children = vec![TwimlElement::Play {
            url: audio_url.to_string(),
            loop_count: 1,
        }];

        self.elements.push(TwimlElement::Gather {
            action: action.to_string(),
            method: "POST".to_string(),
            timeout,
            speech_timeout: "auto".to_string(),
            speech_model: "phone_call".to_string(),
            language: language.to_string(),
            children,
        });
        self
    }

    /// Add a Play element
    pub fn play(mut self, url: &str, loop_count: u32) -> Self {
        self.elements.push(TwimlElement::Play {
            url: url.to_string(),
            loop_count,
        });
        self
    }

    /// Add a Pause element
    pub fn pause(mut self, seconds: u32) -> Self {
        self.elements.push(TwimlElement::Pause { length: seconds });
        self
    }

    /// Add a Redirect element
    pub fn redirect(mut self, url: &str) -> Self {
        self.elements.push(TwimlElement::Redirect {
            url: url.to_string(),
            method: "POST".to_string(),
        });
        self
    }

    /// Add a Message element (SMS reply body)
    pub fn message(mut self, text: &str) -> Self {
        self.elements.push(TwimlElement::Message {
            text: xml_escape(text),
        });
        self
    }

    /// Add a Hangup element
    pub fn hangup(mut self) -> Self {
        self.elements.push(TwimlElement::Hangup);
        self
    }

    /// Build the TwiML XML string
    pub fn build(self) -> String {
        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Response>\n");

        for element in self.elements {
            render_element(&mut xml, &element, 1);
        }

        xml.push_str("</Response>");
        xml
    }

    /// An empty `<Response/>` document (acknowledge without instructions)
    pub fn empty() -> String {
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Response>\n</Response>".to_string()
    }

    /// Spoken apology followed by a clean hangup
    pub fn spoken_error(message: &str, voice: &str, language: &str) -> String {
        TwimlBuilder::new()
            .say(message, voice, language)
            .pause(1)
            .hangup()
            .build()
    }
}

/// Render a TwiML element to XML
fn render_element(xml: &mut String, element: &TwimlElement, indent: usize) {
    let indent_str = "  ".repeat(indent);

    match element {
        TwimlElement::Say {
            text,
            voice,
            language,
        } => {
            let _ = writeln!(
                xml,
                "{}<Say voice=\"{}\" language=\"{}\">{}</Say>",
                indent_str, voice, language, text
            );
        }
        TwimlElement::Gather {
            action,
            method,
            timeout,
            speech_timeout,
            speech_model,
            language,
            children,
        } => {
            let _ = write!(
                xml,
                "{}<Gather input=\"speech\" action=\"{}\" method=\"{}\" timeout=\"{}\" \
                 speechTimeout=\"{}\" speechModel=\"{}\" language=\"{}\"",
                indent_str, action, method, timeout, speech_timeout, speech_model, language
            );

            if children.is_empty() {
                let _ = writeln!(xml, "/>");
            } else {
                let _ = writeln!(xml, ">");
                for child in children {
                    render_element(xml, child, indent + 1);
                }
                let _ = writeln!(xml, "{}</Gather>", indent_str);
            }
        }
        TwimlElement::Play { url, loop_count } => {
            let _ = writeln!(
                xml,
                "{}<Play loop=\"{}\">{}</Play>",
                indent_str, loop_count, url
            );
        }
        TwimlElement::Pause { length } => {
            let _ = writeln!(xml, "{}<Pause length=\"{}\"/>", indent_str, length);
        }
        TwimlElement::Redirect { url, method } => {
            let _ = writeln!(
                xml,
                "{}<Redirect method=\"{}\">{}</Redirect>",
                indent_str, method, url
            );
        }
        TwimlElement::Message { text } => {
            let _ = writeln!(xml, "{}<Message>{}</Message>", indent_str, text);
        }
        TwimlElement::Hangup => {
            let _ = writeln!(xml, "{}<Hangup/>", indent_str);
        }
    }
}

/// Escape special XML characters
fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_with_audio() {
        let twiml = TwimlBuilder::new()
            .gather_speech_with_audio(
                "https://example.com/audio/abc",
                "/webhook/voice",
                5,
                "en-US",
            )
            .redirect("/webhook/voice")
            .build();
        assert!(twiml.contains("<Response>"));
        assert!(twiml.contains("<Gather input=\"speech\""));
        assert!(twiml.contains("timeout=\"5\""));
        assert!(twiml.contains("<Play loop=\"1\">https://example.com/audio/abc</Play>"));
        assert!(twiml.contains("<Redirect"));
        assert!(twiml.contains("</Response>"));
    }

    #[test]
    fn test_goodbye_twiml() {
        let twiml = TwimlBuilder::new()
            .say("Goodbye!", "Polly.Joanna", "en-US")
            .pause(1)
            .hangup()
            .build();
        assert!(twiml.contains("<Hangup/>"));
        assert!(twiml.contains("Goodbye"));
    }

    #[test]
    fn test_message_twiml() {
        let twiml = TwimlBuilder::new().message("On my way & running late").build();
        assert!(twiml.contains("<Message>On my way &amp; running late</Message>"));
    }

    #[test]
    fn test_xml_escape() {
        let escaped = xml_escape("Hello <world> & \"friends\"");
        assert_eq!(escaped, "Hello &lt;world&gt; &amp; &quot;friends&quot;");
    }
}
