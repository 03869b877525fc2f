// SPDX-License-Identifier: GPL-3.0-only

//! In-process media engine
//!
//! Understands enough of the launch syntax to find elements, their `name=`
//! and their properties. Nothing is decoded or encoded: property changes and
//! state changes are recorded so callers can inspect what a running graph was
//! told to do, and application sources are pulled on demand with
//! [`HeadlessGraph::pull_frame`].

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::debug;

use super::{
    ElementHandle, ElementRef, ElementState, FramePuller, FrameSourceConfig, MediaEngine,
    MediaGraph, PropertyValue,
};
use crate::backends::camera::CameraFrame;
use crate::errors::{MediaError, MediaResult};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Engine that parses descriptions without running them
#[derive(Debug, Default)]
pub struct HeadlessEngine {
    parsed: AtomicUsize,
}

impl HeadlessEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of graphs successfully parsed so far
    pub fn graphs_parsed(&self) -> usize {
        self.parsed.load(Ordering::SeqCst)
    }
}

impl MediaEngine for HeadlessEngine {
    fn name(&self) -> &'static str {
        "headless"
    }

    fn parse_graph(&self, description: &str) -> MediaResult<Box<dyn MediaGraph>> {
        let elements = parse_description(description)?;
        self.parsed.fetch_add(1, Ordering::SeqCst);
        debug!(elements = elements.len(), "Parsed headless graph");
        Ok(Box::new(HeadlessGraph::new(description, elements)))
    }
}

/// One element of a headless graph
#[derive(Debug)]
pub struct HeadlessElement {
    name: String,
    factory: String,
    properties: Mutex<BTreeMap<String, PropertyValue>>,
    history: Mutex<Vec<(String, PropertyValue)>>,
    state: Mutex<ElementState>,
}

impl HeadlessElement {
    fn new(name: String, factory: String, properties: BTreeMap<String, PropertyValue>) -> Self {
        Self {
            name,
            factory,
            properties: Mutex::new(properties),
            history: Mutex::new(Vec::new()),
            state: Mutex::new(ElementState::Null),
        }
    }
}

struct HeadlessHandle {
    name: String,
    element: Weak<HeadlessElement>,
}

impl HeadlessHandle {
    fn new(element: &Arc<HeadlessElement>) -> Self {
        Self {
            name: element.name.clone(),
            element: Arc::downgrade(element),
        }
    }

    fn upgrade(&self) -> MediaResult<Arc<HeadlessElement>> {
        self.element
            .upgrade()
            .ok_or_else(|| MediaError::NotFound(format!("element {} is gone", self.name)))
    }
}

impl ElementHandle for HeadlessHandle {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_alive(&self) -> bool {
        self.element.strong_count() > 0
    }

    fn property(&self, name: &str) -> MediaResult<PropertyValue> {
        let element = self.upgrade()?;
        let value = lock(&element.properties).get(name).cloned();
        value.ok_or_else(|| MediaError::NotFound(format!("{}.{}", self.name, name)))
    }

    fn set_property(&self, name: &str, value: PropertyValue) -> MediaResult<()> {
        let element = self.upgrade()?;
        lock(&element.history).push((name.to_string(), value.clone()));
        lock(&element.properties).insert(name.to_string(), value);
        Ok(())
    }

    fn set_state(&self, state: ElementState) -> MediaResult<()> {
        let element = self.upgrade()?;
        *lock(&element.state) = state;
        Ok(())
    }
}

/// Graph produced by [`HeadlessEngine`]
pub struct HeadlessGraph {
    description: String,
    root: Arc<HeadlessElement>,
    elements: Vec<Arc<HeadlessElement>>,
    sources: Mutex<HashMap<String, FramePuller>>,
    eos: AtomicBool,
}

impl HeadlessGraph {
    fn new(description: &str, elements: Vec<HeadlessElement>) -> Self {
        Self {
            description: description.to_string(),
            root: Arc::new(HeadlessElement::new(
                "pipeline0".to_string(),
                "pipeline".to_string(),
                BTreeMap::new(),
            )),
            elements: elements.into_iter().map(Arc::new).collect(),
            sources: Mutex::new(HashMap::new()),
            eos: AtomicBool::new(false),
        }
    }

    fn find(&self, name: &str) -> Option<&Arc<HeadlessElement>> {
        self.elements.iter().find(|e| e.name == name)
    }

    pub fn element_names(&self) -> Vec<String> {
        self.elements.iter().map(|e| e.name.clone()).collect()
    }

    pub fn factory_of(&self, name: &str) -> Option<String> {
        self.find(name).map(|e| e.factory.clone())
    }

    /// Current value of a property, whether set in the description or later
    pub fn property(&self, element: &str, property: &str) -> Option<PropertyValue> {
        let element = self.find(element)?;
        lock(&element.properties).get(property).cloned()
    }

    /// Property changes made after parsing, oldest first
    pub fn property_history(&self, element: &str) -> Vec<(String, PropertyValue)> {
        self.find(element)
            .map(|e| lock(&e.history).clone())
            .unwrap_or_default()
    }

    pub fn state(&self) -> ElementState {
        *lock(&self.root.state)
    }

    pub fn element_state(&self, name: &str) -> Option<ElementState> {
        self.find(name).map(|e| *lock(&e.state))
    }

    pub fn has_frame_source(&self, name: &str) -> bool {
        lock(&self.sources).contains_key(name)
    }

    /// Ask the named application source for one frame, as the engine would
    pub fn pull_frame(&self, source: &str) -> Option<CameraFrame> {
        let mut sources = lock(&self.sources);
        let puller = sources.get_mut(source)?;
        puller()
    }

    pub fn eos_sent(&self) -> bool {
        self.eos.load(Ordering::SeqCst)
    }
}

impl MediaGraph for HeadlessGraph {
    fn description(&self) -> &str {
        &self.description
    }

    fn element(&self, name: &str) -> Option<ElementRef> {
        self.find(name)
            .map(|e| Arc::new(HeadlessHandle::new(e)) as ElementRef)
    }

    fn root(&self) -> ElementRef {
        Arc::new(HeadlessHandle::new(&self.root))
    }

    fn configure_frame_source(
        &self,
        name: &str,
        config: &FrameSourceConfig,
        puller: FramePuller,
    ) -> MediaResult<()> {
        let element = self
            .find(name)
            .ok_or_else(|| MediaError::NotFound(format!("frame source {}", name)))?;
        if element.factory != "appsrc" {
            return Err(MediaError::InvalidArgument(format!(
                "{} is a {}, not an application source",
                name, element.factory
            )));
        }

        {
            let mut properties = lock(&element.properties);
            properties.insert("caps".into(), PropertyValue::Str(config.caps_string()));
            properties.insert("format".into(), PropertyValue::Str("time".into()));
            properties.insert("is-live".into(), PropertyValue::Bool(true));
        }
        lock(&self.sources).insert(name.to_string(), puller);
        Ok(())
    }

    fn set_state(&self, state: ElementState) -> MediaResult<()> {
        *lock(&self.root.state) = state;
        for element in &self.elements {
            *lock(&element.state) = state;
        }
        Ok(())
    }

    fn send_eos(&self) -> MediaResult<()> {
        self.eos.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn parse_value(raw: &str) -> PropertyValue {
    if let Some(inner) = raw.strip_prefix('"').and_then(|r| r.strip_suffix('"')) {
        return PropertyValue::Str(unescape(inner));
    }
    let raw = raw.trim_matches('\'');
    match raw {
        "true" => PropertyValue::Bool(true),
        "false" => PropertyValue::Bool(false),
        _ => match raw.parse::<i32>() {
            Ok(v) => PropertyValue::Int(v),
            Err(_) => PropertyValue::Str(raw.to_string()),
        },
    }
}

fn unescape(quoted: &str) -> String {
    let mut out = String::with_capacity(quoted.len());
    let mut chars = quoted.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.extend(chars.next()),
            c => out.push(c),
        }
    }
    out
}

/// Split on `is_separator` outside double-quoted strings
fn split_unquoted(text: &str, is_separator: impl Fn(char) -> bool) -> MediaResult<Vec<&str>> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            c if !in_quotes && is_separator(c) => {
                parts.push(&text[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    if in_quotes {
        return Err(protocol_error("unterminated quoted string"));
    }
    parts.push(&text[start..]);
    Ok(parts)
}

fn is_factory_token(token: &str) -> bool {
    !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '/' | '.'))
}

fn protocol_error(msg: impl Into<String>) -> MediaError {
    MediaError::ProtocolError(msg.into())
}

/// Split a launch description into elements with their properties
fn parse_description(description: &str) -> MediaResult<Vec<HeadlessElement>> {
    if description.trim().is_empty() {
        return Err(protocol_error("empty description"));
    }

    // (factory, explicit name, properties)
    let mut parsed: Vec<(String, Option<String>, BTreeMap<String, PropertyValue>)> = Vec::new();

    for segment in split_unquoted(description, |c| c == '!')? {
        if segment.trim().is_empty() {
            return Err(protocol_error("link without an element"));
        }

        let mut current: Option<usize> = None;
        for token in split_unquoted(segment, char::is_whitespace)? {
            let token = token.trim_end_matches(',');
            if token.is_empty() {
                continue;
            }

            if let Some((key, value)) = token.split_once('=') {
                let index =
                    current.ok_or_else(|| protocol_error(format!("property {} without element", key)))?;
                let entry = &mut parsed[index];
                if key == "name" {
                    entry.1 = Some(value.trim_matches('"').to_string());
                } else {
                    entry.2.insert(key.to_string(), parse_value(value));
                }
            } else if let Some(reference) = token.strip_suffix('.') {
                let known = parsed
                    .iter()
                    .any(|(_, name, _)| name.as_deref() == Some(reference));
                if !known {
                    return Err(protocol_error(format!("no element named {}", reference)));
                }
                current = None;
            } else if is_factory_token(token) {
                parsed.push((token.to_string(), None, BTreeMap::new()));
                current = Some(parsed.len() - 1);
            } else {
                return Err(protocol_error(format!("unexpected token {}", token)));
            }
        }
    }

    let mut counters: HashMap<String, usize> = HashMap::new();
    let mut elements: Vec<HeadlessElement> = Vec::with_capacity(parsed.len());
    for (factory, name, properties) in parsed {
        let name = match name {
            Some(name) => name,
            None => {
                let n = counters.entry(factory.clone()).or_insert(0);
                let generated = format!("{}{}", factory, n);
                *n += 1;
                generated
            }
        };
        if elements.iter().any(|e| e.name == name) {
            return Err(protocol_error(format!("duplicate element name {}", name)));
        }
        elements.push(HeadlessElement::new(name, factory, properties));
    }

    Ok(elements)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(description: &str) -> Box<dyn MediaGraph> {
        HeadlessEngine::new().parse_graph(description).unwrap()
    }

    fn headless(graph: &dyn MediaGraph) -> &HeadlessGraph {
        graph.as_any().downcast_ref::<HeadlessGraph>().unwrap()
    }

    #[test]
    fn named_elements_and_properties_are_found() {
        let graph = parse(
            "appsrc name=mysrc ! videoconvert ! video/x-raw, format=I420, width=640 \
             ! tee name=t t. ! queue ! valve name=gate drop=true ! fakesink",
        );
        let g = headless(graph.as_ref());
        assert!(graph.element("mysrc").is_some());
        assert!(graph.element("gate").is_some());
        assert!(graph.element("missing").is_none());
        assert_eq!(g.property("gate", "drop"), Some(PropertyValue::Bool(true)));
        assert_eq!(g.factory_of("t").as_deref(), Some("tee"));
        assert!(g.element_names().contains(&"videoconvert0".to_string()));
    }

    #[test]
    fn malformed_descriptions_are_rejected() {
        let engine = HeadlessEngine::new();
        for bad in ["", "   ", "videotestsrc !", "! fakesink", "a ! ! b", "x. ! fakesink", "src (bad)"] {
            assert!(
                matches!(engine.parse_graph(bad), Err(MediaError::ProtocolError(_))),
                "accepted {:?}",
                bad
            );
        }
        assert_eq!(engine.graphs_parsed(), 0);
    }

    #[test]
    fn quoted_values_keep_spaces_and_bangs() {
        let graph = parse(r#"appsrc ! filesink name=out location="/tmp/my videos/a!b \"1\".ts""#);
        assert_eq!(
            headless(graph.as_ref()).property("out", "location"),
            Some(PropertyValue::Str(r#"/tmp/my videos/a!b "1".ts"#.to_string()))
        );

        let engine = HeadlessEngine::new();
        assert!(matches!(
            engine.parse_graph(r#"appsrc ! filesink location="/tmp/open"#),
            Err(MediaError::ProtocolError(_))
        ));
    }

    #[test]
    fn handles_are_weak() {
        let graph = parse("videotestsrc ! valve name=gate ! fakesink");
        let gate = graph.element("gate").unwrap();
        gate.set_property("drop", false.into()).unwrap();
        assert_eq!(
            headless(graph.as_ref()).property_history("gate"),
            vec![("drop".to_string(), PropertyValue::Bool(false))]
        );

        drop(graph);
        assert!(!gate.is_alive());
        assert!(matches!(
            gate.set_property("drop", true.into()),
            Err(MediaError::NotFound(_))
        ));
    }

    #[test]
    fn frame_source_must_be_appsrc() {
        let graph = parse("videotestsrc name=src ! fakesink");
        let config = FrameSourceConfig {
            format: crate::backends::camera::PixelFormat::Grey,
            width: 2,
            height: 2,
            framerate: 25,
        };
        let result = graph.configure_frame_source("src", &config, Box::new(|| None));
        assert!(matches!(result, Err(MediaError::InvalidArgument(_))));
        let result = graph.configure_frame_source("nope", &config, Box::new(|| None));
        assert!(matches!(result, Err(MediaError::NotFound(_))));
    }
}
