//! Writable tree of distributable units
//!
//! A publishable hierarchy is built from a closed set of node kinds:
//! [`File`], [`Directory`], [`Archive`] and the signing decorator
//! [`SignedArchive`]. Every node materializes into an ordered list of
//! [`MaterializedEntry`] values that an external writer lays out on disk.
//! Traversal is depth-first in insertion order, so identical trees always
//! produce identical bytes.

mod bundle;
mod signing;

pub use bundle::{bundle_entries, unbundle};
pub use signing::{
    compute_key_fingerprint, decode_signing_key, decode_verifying_key, encode_signing_key,
    encode_verifying_key, signature_file_name, verify_signed_bundle, ArchiveSigner,
    CryptoProvider, DetachedSignature, SignedArchive, SignerIdentity, SigningError,
    SigningResult, SIGNATURE_ALGORITHM, SIGNATURE_SUFFIX,
};

use std::io;

use thiserror::Error;

/// Errors raised while materializing a tree
#[derive(Debug, Error)]
pub enum StructureError {
    #[error("failed to bundle archive '{name}': {source}")]
    Bundle {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to sign archive '{name}': {source}")]
    Signing {
        name: String,
        #[source]
        source: SigningError,
    },

    #[error("archive '{archive}' already contains an entry named '{name}'")]
    NameCollision { archive: String, name: String },
}

/// Kind of a materialized entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// One addressable unit handed to the external writer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializedEntry {
    /// Slash-separated path relative to the materialized node's parent
    pub path: String,
    pub kind: EntryKind,
    /// File contents; empty for directories
    pub contents: Vec<u8>,
}

impl MaterializedEntry {
    pub fn file(path: impl Into<String>, contents: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::File,
            contents,
        }
    }

    pub fn directory(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Directory,
            contents: Vec::new(),
        }
    }

    fn nested_under(mut self, parent: &str) -> Self {
        self.path = format!("{}/{}", parent, self.path);
        self
    }
}

/// Shared capability of every node kind
pub trait Writable {
    /// Name of this node among its siblings
    fn name(&self) -> &str;

    /// Serialize this node (and everything below it) into addressable entries
    fn materialize(&self) -> Result<Vec<MaterializedEntry>, StructureError>;
}

/// A node of the writable tree
#[derive(Debug)]
pub enum WritableNode {
    File(File),
    Directory(Directory),
    Archive(Archive),
    Signed(SignedArchive),
}

impl Writable for WritableNode {
    fn name(&self) -> &str {
        match self {
            WritableNode::File(f) => f.name(),
            WritableNode::Directory(d) => d.name(),
            WritableNode::Archive(a) => a.name(),
            WritableNode::Signed(s) => s.name(),
        }
    }

    fn materialize(&self) -> Result<Vec<MaterializedEntry>, StructureError> {
        match self {
            WritableNode::File(f) => f.materialize(),
            WritableNode::Directory(d) => d.materialize(),
            WritableNode::Archive(a) => a.materialize(),
            WritableNode::Signed(s) => s.materialize(),
        }
    }
}

impl From<File> for WritableNode {
    fn from(file: File) -> Self {
        WritableNode::File(file)
    }
}

impl From<Directory> for WritableNode {
    fn from(directory: Directory) -> Self {
        WritableNode::Directory(directory)
    }
}

impl From<Archive> for WritableNode {
    fn from(archive: Archive) -> Self {
        WritableNode::Archive(archive)
    }
}

impl From<SignedArchive> for WritableNode {
    fn from(signed: SignedArchive) -> Self {
        WritableNode::Signed(signed)
    }
}

/// A named, immutable byte payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    name: String,
    contents: Vec<u8>,
}

impl File {
    pub fn new(name: impl Into<String>, contents: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            contents,
        }
    }

    pub fn contents(&self) -> &[u8] {
        &self.contents
    }
}

impl Writable for File {
    fn name(&self) -> &str {
        &self.name
    }

    fn materialize(&self) -> Result<Vec<MaterializedEntry>, StructureError> {
        Ok(vec![MaterializedEntry::file(&self.name, self.contents.clone())])
    }
}

/// Ordered children with names unique among siblings
#[derive(Debug, Default)]
struct Children {
    nodes: Vec<WritableNode>,
}

impl Children {
    fn position(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.name() == name)
    }

    /// Append, or replace the same-named child in place; returns its index
    fn add(&mut self, child: WritableNode) -> usize {
        match self.position(child.name()) {
            Some(index) => {
                self.nodes[index] = child;
                index
            }
            None => {
                self.nodes.push(child);
                self.nodes.len() - 1
            }
        }
    }

    fn get(&self, name: &str) -> Option<&WritableNode> {
        self.position(name).map(|i| &self.nodes[i])
    }

    fn materialize(&self) -> Result<Vec<MaterializedEntry>, StructureError> {
        let mut entries = Vec::new();
        for node in &self.nodes {
            entries.extend(node.materialize()?);
        }
        Ok(entries)
    }
}

/// A named directory owning its children
#[derive(Debug)]
pub struct Directory {
    name: String,
    children: Children,
}

impl Directory {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Children::default(),
        }
    }

    /// Add a child; a child with the same name is replaced in place
    pub fn add(&mut self, child: impl Into<WritableNode>) {
        self.children.add(child.into());
    }

    pub fn get(&self, name: &str) -> Option<&WritableNode> {
        self.children.get(name)
    }

    /// Child directory with the given name, created if absent.
    ///
    /// A non-directory child of the same name is replaced.
    pub fn ensure_directory(&mut self, name: &str) -> &mut Directory {
        let index = match self.children.position(name) {
            Some(i) if matches!(self.children.nodes[i], WritableNode::Directory(_)) => i,
            _ => self.children.add(Directory::new(name).into()),
        };
        match &mut self.children.nodes[index] {
            WritableNode::Directory(directory) => directory,
            _ => unreachable!("child at index is a directory"),
        }
    }

    pub fn children(&self) -> impl Iterator<Item = &WritableNode> {
        self.children.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.children.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.nodes.is_empty()
    }
}

impl Writable for Directory {
    fn name(&self) -> &str {
        &self.name
    }

    fn materialize(&self) -> Result<Vec<MaterializedEntry>, StructureError> {
        let mut entries = vec![MaterializedEntry::directory(&self.name)];
        entries.extend(
            self.children
                .materialize()?
                .into_iter()
                .map(|e| e.nested_under(&self.name)),
        );
        Ok(entries)
    }
}

/// A bundle of children materialized as one addressable unit
#[derive(Debug)]
pub struct Archive {
    name: String,
    children: Children,
}

impl Archive {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Children::default(),
        }
    }

    /// Add a child; a child with the same name is replaced in place
    pub fn add(&mut self, child: impl Into<WritableNode>) {
        self.children.add(child.into());
    }

    pub fn get(&self, name: &str) -> Option<&WritableNode> {
        self.children.get(name)
    }

    pub fn children(&self) -> impl Iterator<Item = &WritableNode> {
        self.children.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.children.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.nodes.is_empty()
    }

    /// Entries bundled inside this archive
    pub fn inner_entries(&self) -> Result<Vec<MaterializedEntry>, StructureError> {
        self.children.materialize()
    }

    /// The archive's serialized byte stream
    pub fn to_bytes(&self) -> Result<Vec<u8>, StructureError> {
        let entries = self.inner_entries()?;
        bundle_entries(&entries).map_err(|source| StructureError::Bundle {
            name: self.name.clone(),
            source,
        })
    }
}

impl Writable for Archive {
    fn name(&self) -> &str {
        &self.name
    }

    fn materialize(&self) -> Result<Vec<MaterializedEntry>, StructureError> {
        Ok(vec![MaterializedEntry::file(&self.name, self.to_bytes()?)])
    }
}
