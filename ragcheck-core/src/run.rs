// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Recorded pipeline executions
//!
//! A [`RunTree`] is the call tree recorded for one pipeline invocation. Nodes
//! live in an arena and are addressed by [`RunId`]; every node keeps an
//! ordered child list plus a name -> children multimap so that trace-based
//! evaluators can find intermediate steps by name without walking the tree.
//!
//! On the wire a tree is a nested [`RunRecord`] (`child_runs` arrays), which
//! is rebuilt into the arena (and its index) on deserialization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Name of the top-level run recorded by the RAG pipeline
pub const GET_ANSWER_RUN: &str = "get_answer";

/// Name of the retrieval step recorded under [`GET_ANSWER_RUN`]
pub const RETRIEVE_DOCS_RUN: &str = "retrieve_docs";

/// Index of a node inside its [`RunTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunId(usize);

impl RunId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A retrieved passage
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub content: String,

    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Document {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Join document contents into a single context block
pub fn join_documents(documents: &[Document]) -> String {
    documents
        .iter()
        .map(|d| d.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RunInputs {
    #[serde(default)]
    pub question: Option<String>,
}

impl RunInputs {
    pub fn question(question: impl Into<String>) -> Self {
        Self {
            question: Some(question.into()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RunOutputs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,

    /// Retrieved documents, when the step exposes them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contexts: Option<Vec<Document>>,
}

impl RunOutputs {
    /// Retrieved documents joined into one block, if present
    pub fn joined_contexts(&self) -> Option<String> {
        self.contexts.as_deref().map(join_documents)
    }
}

/// One recorded step of a pipeline invocation
#[derive(Debug, Clone, PartialEq)]
pub struct RunNode {
    pub id: RunId,
    pub name: String,
    pub parent: Option<RunId>,
    pub inputs: RunInputs,
    pub outputs: RunOutputs,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    children: Vec<RunId>,
}

impl RunNode {
    pub fn children(&self) -> &[RunId] {
        &self.children
    }
}

/// A named child run could not be found
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("no run named '{name}' under '{parent}'")]
pub struct TraceLookupError {
    pub parent: String,
    pub name: String,
}

/// Arena-backed call tree for a single pipeline invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RunRecord", into = "RunRecord")]
pub struct RunTree {
    nodes: Vec<RunNode>,
    // Per node: child name -> child ids in recording order.
    by_name: Vec<HashMap<String, Vec<RunId>>>,
}

impl RunTree {
    /// Start a tree with its root run
    pub fn new(root_name: impl Into<String>, inputs: RunInputs) -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            by_name: Vec::new(),
        };
        tree.push_node(root_name.into(), None, inputs);
        tree
    }

    fn push_node(&mut self, name: String, parent: Option<RunId>, inputs: RunInputs) -> RunId {
        let id = RunId(self.nodes.len());
        self.nodes.push(RunNode {
            id,
            name,
            parent,
            inputs,
            outputs: RunOutputs::default(),
            error: None,
            started_at: Utc::now(),
            ended_at: None,
            children: Vec::new(),
        });
        self.by_name.push(HashMap::new());
        id
    }

    /// Record a child run under `parent`
    pub fn add_child(&mut self, parent: RunId, name: impl Into<String>, inputs: RunInputs) -> RunId {
        let name = name.into();
        let id = self.push_node(name.clone(), Some(parent), inputs);
        self.nodes[parent.0].children.push(id);
        self.by_name[parent.0].entry(name).or_default().push(id);
        id
    }

    pub fn set_outputs(&mut self, id: RunId, outputs: RunOutputs) {
        self.nodes[id.0].outputs = outputs;
    }

    pub fn set_error(&mut self, id: RunId, error: impl Into<String>) {
        self.nodes[id.0].error = Some(error.into());
    }

    /// Mark a run as finished now
    pub fn finish(&mut self, id: RunId) {
        self.nodes[id.0].ended_at = Some(Utc::now());
    }

    pub fn root_id(&self) -> RunId {
        RunId(0)
    }

    pub fn root(&self) -> &RunNode {
        &self.nodes[0]
    }

    pub fn node(&self, id: RunId) -> &RunNode {
        &self.nodes[id.0]
    }

    pub fn get(&self, id: RunId) -> Option<&RunNode> {
        self.nodes.get(id.0)
    }

    pub fn parent(&self, id: RunId) -> Option<&RunNode> {
        self.nodes[id.0].parent.map(|p| &self.nodes[p.0])
    }

    pub fn children(&self, id: RunId) -> impl Iterator<Item = &RunNode> {
        self.nodes[id.0].children.iter().map(|c| &self.nodes[c.0])
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// A tree always holds at least its root
    pub fn is_empty(&self) -> bool {
        false
    }

    /// All children of `parent` with the given name, in recording order
    pub fn find_children(&self, parent: RunId, name: &str) -> &[RunId] {
        self.by_name[parent.0]
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// First child of `parent` with the given name, regardless of its
    /// position among siblings
    pub fn find_child(&self, parent: RunId, name: &str) -> Result<&RunNode, TraceLookupError> {
        self.find_children(parent, name)
            .first()
            .map(|id| &self.nodes[id.0])
            .ok_or_else(|| TraceLookupError {
                parent: self.nodes[parent.0].name.clone(),
                name: name.to_string(),
            })
    }

    /// Resolve a path of run names starting at the root.
    ///
    /// The first segment may name the root itself; every other segment is a
    /// child lookup. `["get_answer", "retrieve_docs"]` therefore resolves both
    /// when the root is `get_answer` and when `get_answer` is a child of an
    /// outer wrapper run.
    pub fn resolve<S: AsRef<str>>(&self, path: &[S]) -> Result<&RunNode, TraceLookupError> {
        let mut segments = path.iter().map(AsRef::as_ref).peekable();
        if segments.peek() == Some(&self.root().name.as_str()) {
            segments.next();
        }

        let mut current = self.root_id();
        for segment in segments {
            current = self.find_child(current, segment)?.id;
        }
        Ok(self.node(current))
    }

    /// Convert into the nested wire representation
    pub fn to_record(&self) -> RunRecord {
        self.record_for(self.root_id())
    }

    fn record_for(&self, id: RunId) -> RunRecord {
        let node = self.node(id);
        RunRecord {
            name: node.name.clone(),
            inputs: node.inputs.clone(),
            outputs: node.outputs.clone(),
            error: node.error.clone(),
            started_at: node.started_at,
            ended_at: node.ended_at,
            child_runs: node.children.iter().map(|c| self.record_for(*c)).collect(),
        }
    }
}

/// Nested wire form of a [`RunTree`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub name: String,

    #[serde(default)]
    pub inputs: RunInputs,

    #[serde(default)]
    pub outputs: RunOutputs,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default = "Utc::now")]
    pub started_at: DateTime<Utc>,

    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub child_runs: Vec<RunRecord>,
}

impl RunRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inputs: RunInputs::default(),
            outputs: RunOutputs::default(),
            error: None,
            started_at: Utc::now(),
            ended_at: None,
            child_runs: Vec::new(),
        }
    }

    pub fn with_inputs(mut self, inputs: RunInputs) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_outputs(mut self, outputs: RunOutputs) -> Self {
        self.outputs = outputs;
        self
    }

    pub fn with_child(mut self, child: RunRecord) -> Self {
        self.child_runs.push(child);
        self
    }
}

impl From<RunRecord> for RunTree {
    fn from(record: RunRecord) -> Self {
        let mut tree = RunTree::new(record.name.clone(), record.inputs.clone());
        let root = tree.root_id();
        tree.load_record(root, record);
        tree
    }
}

impl RunTree {
    // Pre-order, so ids follow the order runs were originally recorded in.
    fn load_record(&mut self, id: RunId, record: RunRecord) {
        let node = &mut self.nodes[id.0];
        node.outputs = record.outputs;
        node.error = record.error;
        node.started_at = record.started_at;
        node.ended_at = record.ended_at;

        for child in record.child_runs {
            let child_id = self.add_child(id, child.name.clone(), child.inputs.clone());
            self.load_record(child_id, child);
        }
    }
}

impl From<RunTree> for RunRecord {
    fn from(tree: RunTree) -> Self {
        tree.to_record()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn rag_tree() -> RunTree {
        let mut tree = RunTree::new(GET_ANSWER_RUN, RunInputs::question("What is LCEL?"));
        let root = tree.root_id();
        let retrieve = tree.add_child(root, RETRIEVE_DOCS_RUN, RunInputs::question("What is LCEL?"));
        tree.set_outputs(
            retrieve,
            RunOutputs {
                answer: None,
                contexts: Some(vec![
                    Document::new("LCEL is the LangChain Expression Language."),
                    Document::new("Runnables compose with the pipe operator."),
                ]),
            },
        );
        tree.finish(retrieve);
        tree.set_outputs(
            root,
            RunOutputs {
                answer: Some("A declarative way to compose chains.".to_string()),
                contexts: None,
            },
        );
        tree.finish(root);
        tree
    }

    #[test]
    fn test_find_child_by_name() {
        let tree = rag_tree();
        let node = tree.find_child(tree.root_id(), RETRIEVE_DOCS_RUN).unwrap();
        assert_eq!(node.name, RETRIEVE_DOCS_RUN);
        assert_eq!(node.outputs.contexts.as_ref().map(Vec::len), Some(2));
        assert_eq!(tree.parent(node.id).map(|p| p.name.as_str()), Some(GET_ANSWER_RUN));
    }

    #[test]
    fn test_find_child_absent() {
        let tree = rag_tree();
        let err = tree.find_child(tree.root_id(), "rerank_docs").unwrap_err();
        assert_eq!(
            err,
            TraceLookupError {
                parent: GET_ANSWER_RUN.to_string(),
                name: "rerank_docs".to_string(),
            }
        );
    }

    #[test]
    fn test_resolve_with_and_without_wrapper() {
        let tree = rag_tree();
        let direct = tree.resolve(&[GET_ANSWER_RUN, RETRIEVE_DOCS_RUN]).unwrap();
        assert_eq!(direct.name, RETRIEVE_DOCS_RUN);

        let mut wrapped = RunTree::new("target", RunInputs::default());
        let outer = wrapped.root_id();
        let get_answer = wrapped.add_child(outer, GET_ANSWER_RUN, RunInputs::default());
        wrapped.add_child(get_answer, RETRIEVE_DOCS_RUN, RunInputs::default());
        let nested = wrapped.resolve(&[GET_ANSWER_RUN, RETRIEVE_DOCS_RUN]).unwrap();
        assert_eq!(nested.name, RETRIEVE_DOCS_RUN);
        assert_eq!(nested.parent, Some(get_answer));

        let empty: [&str; 0] = [];
        assert_eq!(tree.resolve(&empty).unwrap().name, GET_ANSWER_RUN);
    }

    #[test]
    fn test_record_rebuilds_index() {
        let tree = rag_tree();
        let json = serde_json::to_string(&tree).unwrap();
        assert!(json.contains("child_runs"));

        let decoded: RunTree = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, tree);
        assert!(decoded
            .find_child(decoded.root_id(), RETRIEVE_DOCS_RUN)
            .is_ok());
    }

    #[test]
    fn test_joined_contexts() {
        let tree = rag_tree();
        let retrieve = tree.resolve(&[RETRIEVE_DOCS_RUN]).unwrap();
        assert_eq!(
            retrieve.outputs.joined_contexts().as_deref(),
            Some("LCEL is the LangChain Expression Language.\n\nRunnables compose with the pipe operator.")
        );
        assert!(tree.root().outputs.joined_contexts().is_none());
    }

    proptest! {
        #[test]
        fn lookup_is_structural(
            names in Just(vec!["retrieve_docs", "other_step", "format_prompt", "llm_call"])
                .prop_shuffle()
        ) {
            let mut tree = RunTree::new(GET_ANSWER_RUN, RunInputs::default());
            let root = tree.root_id();
            for name in &names {
                tree.add_child(root, *name, RunInputs::default());
            }

            let found = tree.find_child(root, RETRIEVE_DOCS_RUN).unwrap();
            prop_assert_eq!(found.name.as_str(), RETRIEVE_DOCS_RUN);
            prop_assert!(tree.find_child(root, "missing").is_err());
        }
    }
}
