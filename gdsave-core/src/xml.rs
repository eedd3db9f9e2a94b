use indexmap::IndexMap;

use crate::error::FormatError;

/// A node in a parsed save document
#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

/// An element with its attributes in document order
#[derive(Debug, Clone, PartialEq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: IndexMap<String, String>,
    pub children: Vec<XmlNode>,
}

/// Document representing a parsed save payload
#[derive(Debug, Clone, PartialEq)]
pub struct XmlDocument {
    root: XmlElement,
}

impl XmlDocument {
    pub fn root(&self) -> &XmlElement {
        &self.root
    }

    /// Parse an XML string into a document
    ///
    /// The parser covers what save payloads actually contain: one root
    /// element, attributes, character entities, comments and a leading
    /// declaration. Markup declarations and CDATA sections are rejected.
    pub fn parse(input: &str) -> Result<Self, FormatError> {
        let mut parser = XmlParser::new(input);
        parser.parse_document()
    }

    /// Serialize the document readably: one element per line, tab
    /// indentation, an element with a single text child kept inline,
    /// empty elements self-closed
    pub fn to_pretty_string(&self) -> String {
        let mut output = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
        serialize_element(&self.root, &mut output, 0);
        output
    }
}

/// Parse a decrypted payload and lay it out readably
///
/// Returns the formatter error instead of panicking so callers can fall
/// back to writing the payload unformatted.
pub fn prettify(payload: &[u8]) -> Result<String, FormatError> {
    let text = std::str::from_utf8(payload)?;
    Ok(XmlDocument::parse(text)?.to_pretty_string())
}

/// Simple XML parser over the save payload dialect
struct XmlParser {
    input: Vec<char>,
    pos: usize,
}

impl XmlParser {
    fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            pos: 0,
        }
    }

    fn parse_document(&mut self) -> Result<XmlDocument, FormatError> {
        self.skip_misc()?;

        if self.is_eof() {
            return Err(self.fail("document has no root element"));
        }

        let root = self.parse_element()?;

        self.skip_misc()?;
        if !self.is_eof() {
            return Err(self.fail("content after document root"));
        }

        Ok(XmlDocument { root })
    }

    /// Skip whitespace, processing instructions (the `<?xml?>` declaration
    /// included) and comments outside the root element
    fn skip_misc(&mut self) -> Result<(), FormatError> {
        loop {
            self.skip_whitespace();

            if self.starts_with("<?") {
                self.skip_processing_instruction()?;
            } else if self.starts_with("<!--") {
                self.skip_comment()?;
            } else if self.starts_with("<!") {
                return Err(self.fail("unsupported markup declaration"));
            } else {
                return Ok(());
            }
        }
    }

    fn parse_element(&mut self) -> Result<XmlElement, FormatError> {
        if !self.consume_char('<') {
            return Err(self.fail("expected '<'"));
        }

        let name = self.parse_name()?;
        let mut attributes = IndexMap::new();

        loop {
            self.skip_whitespace();

            if self.consume_str("/>") {
                return Ok(XmlElement {
                    name,
                    attributes,
                    children: Vec::new(),
                });
            }
            if self.consume_char('>') {
                break;
            }
            if self.is_eof() {
                return Err(self.fail(format!("unterminated tag '{name}'")));
            }

            let (attr, value) = self.parse_attribute()?;
            attributes.insert(attr, value);
        }

        let children = self.parse_children(&name)?;

        Ok(XmlElement {
            name,
            attributes,
            children,
        })
    }

    fn parse_children(&mut self, name: &str) -> Result<Vec<XmlNode>, FormatError> {
        let mut children = Vec::new();

        loop {
            if self.is_eof() {
                return Err(self.fail(format!("unterminated element '{name}'")));
            }

            if self.consume_str("</") {
                let close = self.parse_name()?;
                if close != name {
                    return Err(self.fail(format!(
                        "mismatched closing tag: expected '</{name}>', found '</{close}>'"
                    )));
                }
                self.skip_whitespace();
                if !self.consume_char('>') {
                    return Err(self.fail(format!("expected '>' after '</{close}'")));
                }
                // Whitespace around child elements is layout; in an element
                // holding nothing but text it is the value itself
                if children.iter().any(|ch| matches!(ch, XmlNode::Element(_))) {
                    children.retain(|ch| match ch {
                        XmlNode::Text(text) => text.chars().any(|c| !c.is_whitespace()),
                        XmlNode::Element(_) => true,
                    });
                }
                return Ok(children);
            }

            if self.starts_with("<!--") {
                self.skip_comment()?;
            } else if self.starts_with("<?") {
                self.skip_processing_instruction()?;
            } else if self.starts_with("<!") {
                return Err(self.fail("unsupported markup"));
            } else if self.peek() == '<' {
                children.push(XmlNode::Element(self.parse_element()?));
            } else {
                let text = self.parse_text()?;
                children.push(XmlNode::Text(text));
            }
        }
    }

    fn parse_name(&mut self) -> Result<String, FormatError> {
        let mut name = String::new();

        while !self.is_eof() {
            let ch = self.peek();
            if ch.is_alphanumeric() || matches!(ch, '_' | '-' | '.' | ':') {
                name.push(self.next());
            } else {
                break;
            }
        }

        if name.is_empty() {
            return Err(self.fail("expected name"));
        }

        Ok(name)
    }

    fn parse_attribute(&mut self) -> Result<(String, String), FormatError> {
        let name = self.parse_name()?;
        self.skip_whitespace();

        if !self.consume_char('=') {
            return Err(self.fail(format!("expected '=' after attribute '{name}'")));
        }

        self.skip_whitespace();
        let quote = self.next();
        if quote != '"' && quote != '\'' {
            return Err(self.fail(format!("expected quoted value for attribute '{name}'")));
        }

        let mut value = String::new();
        while !self.is_eof() {
            let ch = self.peek();
            if ch == quote {
                self.next();
                return Ok((name, value));
            }
            if ch == '&' {
                value.push(self.parse_entity()?);
            } else {
                value.push(self.next());
            }
        }

        Err(self.fail(format!("unterminated value for attribute '{name}'")))
    }

    fn parse_text(&mut self) -> Result<String, FormatError> {
        let mut text = String::new();

        while !self.is_eof() && self.peek() != '<' {
            if self.peek() == '&' {
                text.push(self.parse_entity()?);
            } else {
                text.push(self.next());
            }
        }

        Ok(text)
    }

    /// Decode `&amp;`-style named entities and `&#65;`/`&#x41;` character
    /// references
    fn parse_entity(&mut self) -> Result<char, FormatError> {
        self.next();

        let mut body = String::new();
        while !self.is_eof() && self.peek() != ';' {
            if body.len() > 10 {
                return Err(self.fail(format!("invalid entity '&{body}...'")));
            }
            body.push(self.next());
        }

        if !self.consume_char(';') {
            return Err(self.fail(format!("unterminated entity '&{body}'")));
        }

        match body.as_str() {
            "amp" => Ok('&'),
            "lt" => Ok('<'),
            "gt" => Ok('>'),
            "quot" => Ok('"'),
            "apos" => Ok('\''),
            _ => {
                let code = if let Some(hex) = body.strip_prefix("#x") {
                    u32::from_str_radix(hex, 16).ok()
                } else if let Some(dec) = body.strip_prefix('#') {
                    dec.parse::<u32>().ok()
                } else {
                    None
                };

                code.and_then(char::from_u32)
                    .ok_or_else(|| self.fail(format!("unknown entity '&{body};'")))
            }
        }
    }

    fn skip_processing_instruction(&mut self) -> Result<(), FormatError> {
        self.consume_str("<?");
        while !self.is_eof() {
            if self.consume_str("?>") {
                return Ok(());
            }
            self.next();
        }
        Err(self.fail("unterminated processing instruction"))
    }

    fn skip_comment(&mut self) -> Result<(), FormatError> {
        self.consume_str("<!--");
        while !self.is_eof() {
            if self.consume_str("-->") {
                return Ok(());
            }
            self.next();
        }
        Err(self.fail("unterminated comment"))
    }

    fn skip_whitespace(&mut self) {
        while !self.is_eof() && self.peek().is_whitespace() {
            self.next();
        }
    }

    fn starts_with(&self, s: &str) -> bool {
        let mut i = self.pos;
        for ch in s.chars() {
            if i >= self.input.len() || self.input[i] != ch {
                return false;
            }
            i += 1;
        }
        true
    }

    fn peek(&self) -> char {
        if self.is_eof() {
            '\0'
        } else {
            self.input[self.pos]
        }
    }

    fn next(&mut self) -> char {
        let ch = self.peek();
        if !self.is_eof() {
            self.pos += 1;
        }
        ch
    }

    fn consume_char(&mut self, expected: char) -> bool {
        if self.peek() == expected {
            self.next();
            true
        } else {
            false
        }
    }

    fn consume_str(&mut self, s: &str) -> bool {
        if self.starts_with(s) {
            self.pos += s.chars().count();
            true
        } else {
            false
        }
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn fail(&self, message: impl Into<String>) -> FormatError {
        FormatError::Malformed {
            offset: self.pos,
            message: message.into(),
        }
    }
}

/// Serialize one element at the given indent depth
fn serialize_element(element: &XmlElement, output: &mut String, indent: usize) {
    output.push_str(&"\t".repeat(indent));
    output.push('<');
    output.push_str(&element.name);

    for (name, value) in &element.attributes {
        output.push(' ');
        output.push_str(name);
        output.push_str("=\"");
        output.push_str(&escape_attr(value));
        output.push('"');
    }

    match element.children.as_slice() {
        [] => {
            output.push_str("/>\n");
        }
        [XmlNode::Text(text)] => {
            output.push('>');
            output.push_str(&escape_text(text));
            output.push_str("</");
            output.push_str(&element.name);
            output.push_str(">\n");
        }
        children => {
            output.push_str(">\n");
            for child in children {
                match child {
                    XmlNode::Element(child) => serialize_element(child, output, indent + 1),
                    XmlNode::Text(text) => {
                        output.push_str(&"\t".repeat(indent + 1));
                        output.push_str(&escape_text(text));
                        output.push('\n');
                    }
                }
            }
            output.push_str(&"\t".repeat(indent));
            output.push_str("</");
            output.push_str(&element.name);
            output.push_str(">\n");
        }
    }
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(s: &str) -> String {
    escape_text(s).replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal() {
        let doc = XmlDocument::parse("<k>1</k>").unwrap();

        assert_eq!(doc.root().name, "k");
        assert!(doc.root().attributes.is_empty());
        assert_eq!(doc.root().children, vec![XmlNode::Text("1".to_string())]);
    }

    #[test]
    fn test_parse_real_save_fragment() {
        // Structure of a CCGameManager payload as the game writes it:
        // declaration up front, everything on one line, no whitespace
        let input = "<?xml version=\"1.0\"?><plist version=\"1.0\" gjver=\"2.0\"><dict>\
            <k>valueKeeper</k><d><k>gv_0001</k><s>1</s><k>gv_0002</k><s>1</s></d>\
            <k>BGMVolume</k><r>0.75</r><k>binaryVersion</k><i>35</i></dict></plist>";

        let doc = XmlDocument::parse(input).unwrap();
        let root = doc.root();

        assert_eq!(root.name, "plist");
        assert_eq!(root.attributes.get("version"), Some(&"1.0".to_string()));
        assert_eq!(root.attributes.get("gjver"), Some(&"2.0".to_string()));
        assert_eq!(
            root.attributes.keys().collect::<Vec<_>>(),
            vec!["version", "gjver"]
        );

        let XmlNode::Element(dict) = &root.children[0] else {
            panic!("Expected dict element");
        };
        assert_eq!(dict.name, "dict");
        assert_eq!(dict.children.len(), 6);

        let XmlNode::Element(first_key) = &dict.children[0] else {
            panic!("Expected k element");
        };
        assert_eq!(first_key.name, "k");
        assert_eq!(
            first_key.children,
            vec![XmlNode::Text("valueKeeper".to_string())]
        );

        let XmlNode::Element(store) = &dict.children[1] else {
            panic!("Expected d element");
        };
        assert_eq!(store.name, "d");
        assert_eq!(store.children.len(), 4);
    }

    #[test]
    fn test_pretty_layout() {
        let input = "<plist version=\"1.0\"><dict><k>gems</k><i>42</i><t/></dict></plist>";
        let doc = XmlDocument::parse(input).unwrap();

        let expected = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
            <plist version=\"1.0\">\n\
            \t<dict>\n\
            \t\t<k>gems</k>\n\
            \t\t<i>42</i>\n\
            \t\t<t/>\n\
            \t</dict>\n\
            </plist>\n";

        assert_eq!(doc.to_pretty_string(), expected);
    }

    #[test]
    fn test_pretty_is_idempotent() {
        let input = "<plist><dict><k>name</k><s>Stereo Madness</s><k>done</k><t/></dict></plist>";

        let doc = XmlDocument::parse(input).unwrap();
        let pretty = doc.to_pretty_string();
        let doc2 = XmlDocument::parse(&pretty).unwrap();

        assert_eq!(doc, doc2);
        assert_eq!(doc2.to_pretty_string(), pretty);
    }

    #[test]
    fn test_entities() {
        let doc = XmlDocument::parse("<s>Rock &amp; Roll &lt;3 &#65;&#x42;&apos;</s>").unwrap();

        assert_eq!(
            doc.root().children,
            vec![XmlNode::Text("Rock & Roll <3 AB'".to_string())]
        );

        // Serialization escapes what must not appear raw and nothing else
        assert!(
            doc.to_pretty_string()
                .contains("<s>Rock &amp; Roll &lt;3 AB'</s>")
        );
    }

    #[test]
    fn test_attribute_quoting_and_escapes() {
        let doc = XmlDocument::parse("<lvl name='A &quot;hard&quot; one'/>").unwrap();

        assert_eq!(
            doc.root().attributes.get("name"),
            Some(&"A \"hard\" one".to_string())
        );
        assert!(
            doc.to_pretty_string()
                .contains("<lvl name=\"A &quot;hard&quot; one\"/>")
        );
    }

    #[test]
    fn test_whitespace_between_tags_is_dropped() {
        let input = "<plist>\n\t<dict>\n\t\t<k>1</k>\n\t</dict>\n</plist>";
        let doc = XmlDocument::parse(input).unwrap();

        let XmlNode::Element(dict) = &doc.root().children[0] else {
            panic!("Expected dict element");
        };
        assert_eq!(doc.root().children.len(), 1);
        assert_eq!(dict.children.len(), 1);
    }

    #[test]
    fn test_whitespace_only_value_is_preserved() {
        // A string value holding a single space is data, not layout
        let input = "<dict><k>levelName</k><s> </s></dict>";
        let doc = XmlDocument::parse(input).unwrap();

        let XmlNode::Element(value) = &doc.root().children[1] else {
            panic!("Expected s element");
        };
        assert_eq!(value.children, vec![XmlNode::Text(" ".to_string())]);

        let pretty = doc.to_pretty_string();
        assert!(pretty.contains("<s> </s>"));
        assert_eq!(XmlDocument::parse(&pretty).unwrap(), doc);
    }

    #[test]
    fn test_mixed_content_is_kept() {
        let doc = XmlDocument::parse("<s>one<b/>two</s>").unwrap();

        assert_eq!(
            doc.root().children,
            vec![
                XmlNode::Text("one".to_string()),
                XmlNode::Element(XmlElement {
                    name: "b".to_string(),
                    attributes: IndexMap::new(),
                    children: Vec::new(),
                }),
                XmlNode::Text("two".to_string()),
            ]
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        let input = "<!-- header --><plist><!-- inner --><k>1</k></plist>";
        let doc = XmlDocument::parse(input).unwrap();

        assert_eq!(doc.root().children.len(), 1);
    }

    #[test]
    fn test_malformed_documents() {
        let cases = [
            "",
            "just text",
            "<k>1",
            "<k>1</j>",
            "<k>1</k><k>2</k>",
            "<k>&nope;</k>",
            "<k>a & b</k>",
            "<!DOCTYPE plist><plist/>",
            "<s><![CDATA[x]]></s>",
            "<lvl name=unquoted/>",
        ];

        for case in cases {
            assert!(
                matches!(
                    XmlDocument::parse(case),
                    Err(FormatError::Malformed { .. })
                ),
                "expected parse failure for {case:?}"
            );
        }
    }

    #[test]
    fn test_prettify_bytes() {
        let pretty = prettify(b"<k>1</k>").unwrap();
        assert_eq!(pretty, "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<k>1</k>\n");

        assert!(matches!(
            prettify(&[0xff, 0xfe, 0x00]),
            Err(FormatError::NotUtf8(_))
        ));
    }
}
