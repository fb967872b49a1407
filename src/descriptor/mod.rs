//! Module descriptors (`module.xml`).
//!
//! The document is kept as a small element tree so it can be edited and
//! written back without losing comments, processing instructions or layout
//! text. Text, comments and CDATA are stored in their escaped source form;
//! attribute values are stored unescaped.

pub mod rewriter;

use anyhow::Result;
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::artifact::filesystem::atomic_write;
use crate::error::PackagingError;

pub use rewriter::{rewrite, rewrite_at_path, RewriteOutcome};

/// File name of a module descriptor inside a module directory.
pub const DESCRIPTOR_FILE_NAME: &str = "module.xml";

#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("malformed XML at byte {position}")]
    Xml {
        position: u64,
        #[source]
        source: quick_xml::Error,
    },
    #[error("document has no root element")]
    NoRoot,
    #[error("element <{0}> found after the root element")]
    TrailingElement(String),
    #[error("element <{0}> is never closed")]
    Unclosed(String),
    #[error("unexpected closing tag </{0}>")]
    UnexpectedEnd(String),
    #[error("invalid UTF-8 in descriptor")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("failed to serialize descriptor: {0}")]
    Serialize(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
    CData(String),
    Comment(String),
    ProcessingInstruction(String),
    DocType(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Name without a namespace prefix.
    pub fn local_name(&self) -> &str {
        self.name.rsplit(':').next().unwrap_or(&self.name)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Replace an attribute in place, or append it.
    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|(key, _)| key == name) {
            Some((_, existing)) => *existing = value,
            None => self.attributes.push((name.to_string(), value)),
        }
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            _ => None,
        })
    }

    pub fn child_elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            _ => None,
        })
    }

    /// First child element with this local name.
    pub fn child(&self, local_name: &str) -> Option<&Element> {
        self.child_elements().find(|e| e.local_name() == local_name)
    }

    pub fn child_mut(&mut self, local_name: &str) -> Option<&mut Element> {
        self.child_elements_mut().find(|e| e.local_name() == local_name)
    }

    fn from_start(start: &BytesStart<'_>) -> Result<Self, DescriptorError> {
        let name = std::str::from_utf8(start.name().as_ref())?.to_string();
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|err| DescriptorError::Xml {
                position: 0,
                source: err.into(),
            })?;
            let key = std::str::from_utf8(attr.key.as_ref())?.to_string();
            let value = attr
                .unescape_value()
                .map_err(|source| DescriptorError::Xml { position: 0, source })?
                .into_owned();
            attributes.push((key, value));
        }
        Ok(Self {
            name,
            attributes,
            children: Vec::new(),
        })
    }

    fn write(&self, writer: &mut Writer<Vec<u8>>) -> Result<(), DescriptorError> {
        let mut start = BytesStart::new(self.name.as_str());
        for (key, value) in &self.attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }
        if self.children.is_empty() {
            return write_event(writer, Event::Empty(start));
        }
        write_event(writer, Event::Start(start))?;
        for child in &self.children {
            child.write(writer)?;
        }
        write_event(writer, Event::End(BytesEnd::new(self.name.as_str())))
    }
}

impl Node {
    fn write(&self, writer: &mut Writer<Vec<u8>>) -> Result<(), DescriptorError> {
        match self {
            Node::Element(element) => element.write(writer),
            Node::Text(raw) => write_event(writer, Event::Text(BytesText::from_escaped(raw.as_str()))),
            Node::CData(raw) => write_event(writer, Event::CData(BytesCData::new(raw.as_str()))),
            Node::Comment(raw) => {
                write_event(writer, Event::Comment(BytesText::from_escaped(raw.as_str())))
            }
            Node::ProcessingInstruction(raw) => {
                write_event(writer, Event::PI(BytesText::from_escaped(raw.as_str())))
            }
            Node::DocType(raw) => {
                write_event(writer, Event::DocType(BytesText::from_escaped(raw.as_str())))
            }
        }
    }
}

fn write_event(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), DescriptorError> {
    writer
        .write_event(event)
        .map_err(|err| DescriptorError::Serialize(err.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Declaration {
    version: String,
    encoding: Option<String>,
    standalone: Option<String>,
}

impl Declaration {
    fn from_event(decl: &BytesDecl<'_>) -> Result<Self, DescriptorError> {
        let xml = |source| DescriptorError::Xml { position: 0, source };
        let version = std::str::from_utf8(&decl.version().map_err(xml)?)?.to_string();
        let encoding = match decl.encoding() {
            Some(value) => Some(std::str::from_utf8(&value.map_err(xml)?)?.to_string()),
            None => None,
        };
        let standalone = match decl.standalone() {
            Some(value) => Some(std::str::from_utf8(&value.map_err(xml)?)?.to_string()),
            None => None,
        };
        Ok(Self {
            version,
            encoding,
            standalone,
        })
    }
}

/// A parsed XML document: optional declaration, misc nodes around the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    declaration: Option<Declaration>,
    prolog: Vec<Node>,
    pub root: Element,
    epilog: Vec<Node>,
}

impl Document {
    pub fn parse(text: &str) -> Result<Self, DescriptorError> {
        let mut reader = Reader::from_str(text);
        let mut declaration = None;
        let mut prolog = Vec::new();
        let mut epilog = Vec::new();
        let mut root: Option<Element> = None;
        let mut stack: Vec<Element> = Vec::new();

        loop {
            let event = match reader.read_event() {
                Ok(event) => event,
                Err(source) => {
                    return Err(DescriptorError::Xml {
                        position: reader.buffer_position() as u64,
                        source,
                    })
                }
            };
            let node = match event {
                Event::Eof => break,
                Event::Decl(decl) => {
                    declaration = Some(Declaration::from_event(&decl)?);
                    continue;
                }
                Event::Start(start) => {
                    stack.push(Element::from_start(&start)?);
                    continue;
                }
                Event::End(end) => match stack.pop() {
                    Some(element) => Node::Element(element),
                    None => {
                        let name = String::from_utf8_lossy(end.name().as_ref()).into_owned();
                        return Err(DescriptorError::UnexpectedEnd(name));
                    }
                },
                Event::Empty(start) => Node::Element(Element::from_start(&start)?),
                Event::Text(text) => Node::Text(std::str::from_utf8(&text)?.to_string()),
                Event::CData(data) => Node::CData(std::str::from_utf8(&data)?.to_string()),
                Event::Comment(text) => Node::Comment(std::str::from_utf8(&text)?.to_string()),
                Event::PI(text) => {
                    Node::ProcessingInstruction(std::str::from_utf8(&text)?.to_string())
                }
                Event::DocType(text) => Node::DocType(std::str::from_utf8(&text)?.to_string()),
            };

            if let Some(parent) = stack.last_mut() {
                parent.children.push(node);
                continue;
            }
            match node {
                Node::Element(element) if root.is_none() => root = Some(element),
                Node::Element(element) => return Err(DescriptorError::TrailingElement(element.name)),
                other if root.is_none() => prolog.push(other),
                other => epilog.push(other),
            }
        }

        if let Some(open) = stack.pop() {
            return Err(DescriptorError::Unclosed(open.name));
        }
        Ok(Self {
            declaration,
            prolog,
            root: root.ok_or(DescriptorError::NoRoot)?,
            epilog,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, DescriptorError> {
        let mut writer = Writer::new(Vec::new());
        if let Some(decl) = &self.declaration {
            let event = BytesDecl::new(
                &decl.version,
                decl.encoding.as_deref(),
                decl.standalone.as_deref(),
            );
            write_event(&mut writer, Event::Decl(event))?;
        }
        for node in &self.prolog {
            node.write(&mut writer)?;
        }
        self.root.write(&mut writer)?;
        for node in &self.epilog {
            node.write(&mut writer)?;
        }
        Ok(writer.into_inner())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
    Module,
    ModuleAlias,
    /// Any other root element (e.g. `module-absent`). Left untouched.
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Required,
    Optional,
}

/// A `dependencies/module` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyRef {
    pub name: String,
    pub requirement: Requirement,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDescriptor {
    document: Document,
}

impl ModuleDescriptor {
    pub fn parse(text: &str) -> Result<Self, DescriptorError> {
        Document::parse(text).map(|document| Self { document })
    }

    /// Read and parse, reporting failures as [`PackagingError::DescriptorParse`].
    pub fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|err| PackagingError::io("read", path, err))?;
        Self::parse(&text).map_err(|source| {
            PackagingError::DescriptorParse {
                path: path.to_path_buf(),
                source,
            }
            .into()
        })
    }

    /// Serialize and replace `path` atomically.
    pub fn write(&self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes().map_err(|source| PackagingError::DescriptorParse {
            path: path.to_path_buf(),
            source,
        })?;
        atomic_write(path, &bytes)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, DescriptorError> {
        self.document.to_bytes()
    }

    pub fn kind(&self) -> DescriptorKind {
        match self.document.root.local_name() {
            "module" => DescriptorKind::Module,
            "module-alias" => DescriptorKind::ModuleAlias,
            _ => DescriptorKind::Other,
        }
    }

    pub fn root(&self) -> &Element {
        &self.document.root
    }

    pub fn root_mut(&mut self) -> &mut Element {
        &mut self.document.root
    }

    pub fn name(&self) -> Option<&str> {
        self.document.root.attr("name")
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.document.root.set_attr("name", name);
    }

    pub fn dependencies(&self) -> Vec<DependencyRef> {
        let Some(deps) = self.document.root.child("dependencies") else {
            return Vec::new();
        };
        deps.child_elements()
            .filter(|e| e.local_name() == "module")
            .filter_map(|e| {
                let name = e.attr("name")?.to_string();
                let requirement = match e.attr("optional") {
                    Some("true") => Requirement::Optional,
                    _ => Requirement::Required,
                };
                Some(DependencyRef { name, requirement })
            })
            .collect()
    }

    /// Mutable `dependencies/module` elements.
    pub fn dependency_elements_mut(&mut self) -> Vec<&mut Element> {
        match self.document.root.child_mut("dependencies") {
            Some(deps) => deps
                .child_elements_mut()
                .filter(|e| e.local_name() == "module")
                .collect(),
            None => Vec::new(),
        }
    }

    /// `name` values of `resources/artifact` entries.
    pub fn artifact_names(&self) -> Vec<&str> {
        self.document
            .root
            .child("resources")
            .map(|resources| {
                resources
                    .child_elements()
                    .filter(|e| e.local_name() == "artifact")
                    .filter_map(|e| e.attr("name"))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn resources_mut(&mut self) -> Option<&mut Element> {
        self.document.root.child_mut("resources")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const EJB: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!-- EJB API -->
<module name="javax.ejb.api" xmlns="urn:jboss:module:1.9">
    <properties>
        <property name="jboss.api" value="public"/>
    </properties>
    <resources>
        <artifact name="${jakarta.ejb:jakarta.ejb-api}"/>
    </resources>
    <dependencies>
        <module name="javax.inject.api"/>
        <module name="javax.unknown.thing" optional="true"/>
    </dependencies>
</module>
"#;

    #[test]
    fn parses_module_descriptor() {
        let descriptor = ModuleDescriptor::parse(EJB).unwrap();
        assert_eq!(descriptor.kind(), DescriptorKind::Module);
        assert_eq!(descriptor.name(), Some("javax.ejb.api"));
        assert_eq!(
            descriptor.dependencies(),
            vec![
                DependencyRef {
                    name: "javax.inject.api".into(),
                    requirement: Requirement::Required
                },
                DependencyRef {
                    name: "javax.unknown.thing".into(),
                    requirement: Requirement::Optional
                },
            ]
        );
        assert_eq!(
            descriptor.artifact_names(),
            vec!["${jakarta.ejb:jakarta.ejb-api}"]
        );
    }

    #[test]
    fn reserialization_preserves_structure() {
        let descriptor = ModuleDescriptor::parse(EJB).unwrap();
        let bytes = descriptor.to_bytes().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(text.contains("<!-- EJB API -->"));
        assert_eq!(ModuleDescriptor::parse(&text).unwrap(), descriptor);
    }

    #[test]
    fn escaped_content_survives() {
        let xml = r#"<module name="a&amp;b"><!-- x --><properties><property name="p" value="&lt;v&gt;"/></properties><![CDATA[<raw>]]></module>"#;
        let descriptor = ModuleDescriptor::parse(xml).unwrap();
        assert_eq!(descriptor.name(), Some("a&b"));
        let text = String::from_utf8(descriptor.to_bytes().unwrap()).unwrap();
        assert!(text.contains(r#"name="a&amp;b""#));
        assert!(text.contains("<![CDATA[<raw>]]>"));
        assert_eq!(ModuleDescriptor::parse(&text).unwrap(), descriptor);
    }

    #[test]
    fn alias_and_other_kinds() {
        let alias = ModuleDescriptor::parse(
            r#"<module-alias xmlns="urn:jboss:module:1.9" name="javax.api" target-name="java.se"/>"#,
        )
        .unwrap();
        assert_eq!(alias.kind(), DescriptorKind::ModuleAlias);

        let absent = ModuleDescriptor::parse(r#"<module-absent name="x"/>"#).unwrap();
        assert_eq!(absent.kind(), DescriptorKind::Other);
    }

    #[test]
    fn rejects_malformed_documents() {
        assert!(matches!(
            ModuleDescriptor::parse("<module><resources></module>"),
            Err(DescriptorError::Xml { .. })
        ));
        assert!(matches!(
            ModuleDescriptor::parse("<module>"),
            Err(DescriptorError::Unclosed(_) | DescriptorError::Xml { .. })
        ));
        assert!(matches!(
            ModuleDescriptor::parse("<!-- nothing -->"),
            Err(DescriptorError::NoRoot)
        ));
        assert!(matches!(
            ModuleDescriptor::parse("<a/><b/>"),
            Err(DescriptorError::TrailingElement(_))
        ));
    }

    #[test]
    fn read_failure_names_the_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(DESCRIPTOR_FILE_NAME);
        fs::write(&path, "<module>").unwrap();

        let err = ModuleDescriptor::read(&path).unwrap_err();

        match err.downcast_ref::<PackagingError>() {
            Some(PackagingError::DescriptorParse { path: p, .. }) => assert_eq!(p, &path),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn write_replaces_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("m/main").join(DESCRIPTOR_FILE_NAME);
        let mut descriptor = ModuleDescriptor::parse(EJB).unwrap();
        descriptor.set_name("jakarta.ejb.api");

        descriptor.write(&path).unwrap();

        let back = ModuleDescriptor::read(&path).unwrap();
        assert_eq!(back.name(), Some("jakarta.ejb.api"));
    }
}
