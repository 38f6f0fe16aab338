//! In-memory class model built from class map files.

use std::path::Path;

use indexmap::IndexMap;
use indexmap::map::Entry;

use crate::error::{Error, Result};

/// Placeholder superclass meaning "not yet known".
pub const SENTINEL_SUPERCLASS: &str = "$blank$";

/// One generated Java class.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JavaClass {
    /// Superclass name, possibly [`SENTINEL_SUPERCLASS`].
    pub superclass: String,

    /// Member declarations in first-seen order, without leading tab.
    pub methods: Vec<String>,

    /// Implemented interfaces.
    pub interfaces: Vec<String>,

    /// Hand-written Java appended to the class body.
    pub extensions: Option<String>,
}

impl JavaClass {
    pub fn new(superclass: impl Into<String>, interfaces: Vec<String>) -> Self {
        Self {
            superclass: superclass.into(),
            interfaces,
            ..Default::default()
        }
    }

    pub fn has_sentinel_superclass(&self) -> bool {
        self.superclass == SENTINEL_SUPERCLASS
    }

    /// Add a member line unless it duplicates one already present.
    ///
    /// - Lines containing `{` are definitions and deduplicate on exact text.
    /// - `public native <ret> <signature…>` lines deduplicate on the signature.
    /// - Anything else is always added.
    ///
    /// Returns true if the line was added.
    pub fn add_method(&mut self, line: &str) -> bool {
        let add = if line.contains('{') {
            !self.methods.iter().any(|m| m == line)
        } else if let Some(key) = native_signature(line) {
            !self
                .methods
                .iter()
                .any(|m| first_occurrence_at_end(m, &key))
        } else {
            true
        };

        if add {
            self.methods.push(line.to_string());
        }
        add
    }

    /// Append extension text.
    pub fn append_extension(&mut self, text: &str) {
        self.extensions.get_or_insert_with(String::new).push_str(text);
    }
}

/// Signature of a `public native <ret> …` declaration: the tokens after the
/// return type joined by single spaces.
pub fn native_signature(line: &str) -> Option<String> {
    if line.starts_with(char::is_whitespace) {
        return None;
    }
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 2 || tokens[0] != "public" || tokens[1] != "native" {
        return None;
    }
    Some(tokens.get(3..).map(|rest| rest.join(" ")).unwrap_or_default())
}

// Only the first occurrence of the key counts. A method whose text contains
// the key twice, the first time not at the end, is not a duplicate.
fn first_occurrence_at_end(method: &str, key: &str) -> bool {
    method.len() >= key.len() && method.find(key) == Some(method.len() - key.len())
}

/// All classes from every parsed map file, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassModel {
    classes: IndexMap<String, JavaClass>,
}

impl ClassModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&JavaClass> {
        self.classes.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut JavaClass> {
        self.classes.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &JavaClass)> {
        self.classes.iter()
    }

    /// Declare a class or reopen an existing one.
    ///
    /// Reopening reconciles superclasses: a sentinel on either side yields
    /// the concrete one, two different concrete superclasses are an error.
    /// Interfaces not yet listed are appended.
    pub fn declare(
        &mut self,
        name: &str,
        superclass: &str,
        interfaces: Vec<String>,
        origin: &Path,
    ) -> Result<&mut JavaClass> {
        let class = match self.classes.entry(name.to_string()) {
            Entry::Vacant(vacant) => return Ok(vacant.insert(JavaClass::new(superclass, interfaces))),
            Entry::Occupied(occupied) => occupied.into_mut(),
        };

        if class.superclass != superclass && superclass != SENTINEL_SUPERCLASS {
            if class.has_sentinel_superclass() {
                class.superclass = superclass.to_string();
            } else {
                return Err(Error::SuperclassConflict {
                    class: name.to_string(),
                    existing: class.superclass.clone(),
                    conflicting: superclass.to_string(),
                    origin: origin.to_path_buf(),
                });
            }
        }

        for interface in interfaces {
            if !class.interfaces.contains(&interface) {
                class.interfaces.push(interface);
            }
        }
        Ok(class)
    }
}
