//! The tag library: maps tag URIs to stable integer ids and tag handles to
//! URI prefixes.
//!
//! Tag shorthands in a document (`!!str`, `!local`, `!e!foo`) expand to full
//! URIs through the handle table, then the URI is interned into a [`TagId`].
//! Ids are assigned once per URI and never change for the lifetime of the
//! library, so consumers can compare ids instead of strings.

use hashlink::LinkedHashMap;

/// An interned tag URI.
///
/// Two ids compare equal if and only if they were produced from the same URI
/// by the same [`TagLibrary`]. The ids below [`TagId::FIRST_CUSTOM`] are
/// pre-assigned and identical across libraries.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TagId(usize);

impl TagId {
    /// The `?` non-specific tag: the node carried no tag and resolution is
    /// left to the consumer.
    pub const QUESTION_MARK: TagId = TagId(0);
    /// The `!` non-specific tag: the node carried a lone `!`, pinning it to
    /// the default type for its kind.
    pub const EXCLAMATION_MARK: TagId = TagId(1);
    /// `tag:yaml.org,2002:str`
    pub const STR: TagId = TagId(2);
    /// `tag:yaml.org,2002:seq`
    pub const SEQ: TagId = TagId(3);
    /// `tag:yaml.org,2002:map`
    pub const MAP: TagId = TagId(4);
    /// `tag:yaml.org,2002:null`
    pub const NULL: TagId = TagId(5);
    /// `tag:yaml.org,2002:bool`
    pub const BOOL: TagId = TagId(6);
    /// `tag:yaml.org,2002:int`
    pub const INT: TagId = TagId(7);
    /// `tag:yaml.org,2002:float`
    pub const FLOAT: TagId = TagId(8);
    /// `tag:yaml.org,2002:binary`
    pub const BINARY: TagId = TagId(9);
    /// `tag:yaml.org,2002:timestamp`
    pub const TIMESTAMP: TagId = TagId(10);

    /// First id handed out to URIs registered at runtime.
    pub const FIRST_CUSTOM: TagId = TagId(11);

    /// Whether the id is one of the two non-specific tags.
    #[must_use]
    pub fn is_non_specific(self) -> bool {
        self == TagId::QUESTION_MARK || self == TagId::EXCLAMATION_MARK
    }
}

/// Prefix every `tag:yaml.org,2002:*` URI shares.
pub const YAML_TAG_PREFIX: &str = "tag:yaml.org,2002:";

const CORE_SCHEMA: &[(&str, TagId)] = &[
    ("tag:yaml.org,2002:str", TagId::STR),
    ("tag:yaml.org,2002:seq", TagId::SEQ),
    ("tag:yaml.org,2002:map", TagId::MAP),
    ("tag:yaml.org,2002:null", TagId::NULL),
    ("tag:yaml.org,2002:bool", TagId::BOOL),
    ("tag:yaml.org,2002:int", TagId::INT),
    ("tag:yaml.org,2002:float", TagId::FLOAT),
    ("tag:yaml.org,2002:binary", TagId::BINARY),
    ("tag:yaml.org,2002:timestamp", TagId::TIMESTAMP),
];

/// Mutable registry of tag URIs and tag handles.
///
/// A library may be shared across sequential parses. `%TAG` bindings are
/// per-document; the parser calls [`TagLibrary::reset_handles`] when a new
/// document starts.
#[derive(Clone, Debug)]
pub struct TagLibrary {
    tags: LinkedHashMap<String, TagId>,
    handles: LinkedHashMap<String, String>,
    next_id: usize,
}

impl TagLibrary {
    /// A library with only the primary (`!`) and secondary (`!!`) handles
    /// bound. URIs intern on demand.
    #[must_use]
    pub fn new() -> TagLibrary {
        let mut lib = TagLibrary {
            tags: LinkedHashMap::new(),
            handles: LinkedHashMap::new(),
            next_id: TagId::FIRST_CUSTOM.0,
        };
        lib.reset_handles();
        lib
    }

    /// A library with the YAML 1.2 core schema pre-registered (`!!str`,
    /// `!!int`, `!!float`, `!!bool`, `!!null`, `!!seq`, `!!map`, `!!binary`,
    /// `!!timestamp`) in addition to the default handles.
    #[must_use]
    pub fn extended() -> TagLibrary {
        let mut lib = TagLibrary::new();
        for &(uri, id) in CORE_SCHEMA {
            lib.tags.insert(uri.to_string(), id);
        }
        lib
    }

    /// The URI prefix a handle currently maps to, or `""` if the handle is
    /// unknown.
    #[must_use]
    pub fn resolve(&self, handle: &str) -> &str {
        self.handles.get(handle).map_or("", String::as_str)
    }

    /// Bind `handle` to `prefix`, overriding any previous binding.
    pub fn register_handle(&mut self, handle: &str, prefix: &str) {
        self.handles.insert(handle.to_string(), prefix.to_string());
    }

    /// Intern `uri`, returning its id. Repeated registration of the same URI
    /// yields the same id.
    pub fn register_uri(&mut self, uri: &str) -> TagId {
        if let Some(&id) = self.tags.get(uri) {
            return id;
        }
        let id = TagId(self.next_id);
        self.next_id += 1;
        self.tags.insert(uri.to_string(), id);
        id
    }

    /// The id of an already-registered URI.
    #[must_use]
    pub fn get(&self, uri: &str) -> Option<TagId> {
        self.tags.get(uri).copied()
    }

    /// The URI a given id was interned from.
    #[must_use]
    pub fn uri_of(&self, id: TagId) -> Option<&str> {
        self.tags
            .iter()
            .find(|&(_, &v)| v == id)
            .map(|(k, _)| k.as_str())
    }

    /// Drop all `%TAG` bindings and restore the two default handles.
    pub fn reset_handles(&mut self) {
        self.handles.clear();
        self.handles.insert("!".to_string(), "!".to_string());
        self.handles
            .insert("!!".to_string(), YAML_TAG_PREFIX.to_string());
    }
}

impl Default for TagLibrary {
    fn default() -> Self {
        TagLibrary::extended()
    }
}
