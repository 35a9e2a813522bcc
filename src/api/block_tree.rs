// src/api/block_tree.rs
//! Bounded depth-first retrieval of nested block children.
//!
//! The traversal keeps an explicit stack of open frames instead of
//! recursing, so arbitrarily deep content cannot exhaust the call stack.
//! Each frame owns the pager for one node's children and fetches a page
//! only when its buffered children run out, so the caller can stop
//! pulling at any point without paying for pages it never sees.

use super::pagination::{Pager, Paginator};
use super::ApiRequest;
use crate::error::AppError;
use crate::types::NotionId;
use futures::Stream;
use serde_json::{json, Value};
use std::collections::VecDeque;

/// One block, emitted before any of its descendants.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockNode {
    pub id: NotionId,
    pub block_type: String,
    pub parent_id: Option<NotionId>,
    /// 0 for the traversal root
    pub depth: u32,
    /// What the API reported, whether or not children were fetched
    pub has_children: bool,
    pub raw: Value,
}

impl BlockNode {
    fn from_child(raw: Value, parent: &NotionId, depth: u32) -> Result<Self, AppError> {
        let id = raw
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                AppError::MalformedResponse(format!("child of block {} has no id", parent))
            })
            .and_then(|id| {
                NotionId::parse(id).map_err(|e| AppError::MalformedResponse(e.to_string()))
            })?;
        let block_type = raw
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("unsupported")
            .to_string();
        let has_children = raw
            .get("has_children")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        Ok(Self {
            id,
            block_type,
            parent_id: Some(parent.clone()),
            depth,
            has_children,
            raw,
        })
    }
}

/// Children of one expanded node still to be yielded.
struct Frame {
    parent: NotionId,
    /// Depth of the children, one below `parent`
    depth: u32,
    pager: Pager,
    buffered: VecDeque<Value>,
}

/// Starts traversals that share one paginator.
#[derive(Clone)]
pub struct BlockTreeFetcher {
    paginator: Paginator,
}

impl BlockTreeFetcher {
    pub fn new(paginator: Paginator) -> Self {
        Self { paginator }
    }

    /// Walks the blocks below `root_id`, at most `max_depth` levels deep.
    ///
    /// The root itself is yielded first at depth 0 and is always expanded.
    /// Nodes at `max_depth` are yielded but their children are never
    /// requested.
    pub fn traverse(
        &self,
        root_id: NotionId,
        root_type: impl Into<String>,
        max_depth: u32,
    ) -> BlockTraversal {
        let block_type = root_type.into();
        let root = BlockNode {
            raw: json!({
                "object": block_type,
                "id": root_id.to_hyphenated(),
                "has_children": true,
            }),
            id: root_id,
            block_type,
            parent_id: None,
            depth: 0,
            has_children: true,
        };
        BlockTraversal {
            paginator: self.paginator.clone(),
            max_depth,
            root: Some(root),
            frames: Vec::new(),
            expanded: 0,
        }
    }
}

/// A lazy depth-first sequence of `BlockNode`s.
pub struct BlockTraversal {
    paginator: Paginator,
    max_depth: u32,
    root: Option<BlockNode>,
    frames: Vec<Frame>,
    expanded: u32,
}

impl BlockTraversal {
    /// Yields the next node, fetching at most one page of children first.
    ///
    /// A node's children are listed only once the caller asks for the node
    /// after it. On failure the open frames keep their buffered children
    /// and cursors, so the traversal is not advanced.
    pub async fn next_node(&mut self) -> Result<Option<BlockNode>, AppError> {
        if let Some(root) = self.root.take() {
            self.open(&root);
            return Ok(Some(root));
        }

        loop {
            let Some(frame) = self.frames.last_mut() else {
                return Ok(None);
            };

            if let Some(raw) = frame.buffered.front() {
                let node = BlockNode::from_child(raw.clone(), &frame.parent, frame.depth)?;
                frame.buffered.pop_front();
                self.open(&node);
                return Ok(Some(node));
            }

            match frame.pager.next_page().await? {
                Some(page) => frame.buffered.extend(page.items),
                None => {
                    self.frames.pop();
                }
            }
        }
    }

    /// Pushes a frame for `node`'s children when it may be expanded.
    fn open(&mut self, node: &BlockNode) {
        if node.depth >= self.max_depth || !node.has_children {
            return;
        }
        let request = ApiRequest::get(format!("blocks/{}/children", node.id.to_hyphenated()));
        self.frames.push(Frame {
            parent: node.id.clone(),
            depth: node.depth + 1,
            pager: self.paginator.paginate(request),
            buffered: VecDeque::new(),
        });
        self.expanded += 1;
    }

    /// How many nodes have been opened for listing so far.
    pub fn expanded(&self) -> u32 {
        self.expanded
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<BlockNode, AppError>> {
        futures::stream::try_unfold(self, |mut traversal| async move {
            Ok(traversal.next_node().await?.map(|node| (node, traversal)))
        })
    }
}
