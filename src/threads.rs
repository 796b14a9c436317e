// src/threads.rs
//! Comment threads.
//!
//! A thread is a root comment plus the replies it owns. Membership is
//! positional: roots live in the thread list, replies in a parent's
//! `replies`. Lookups by thread id are queries over the forest.

use log::{debug, warn};

use crate::error::ApplyError;
use crate::ids::IdGenerator;
use crate::models::{now, AcceptanceState, Comment, CommentStatus, CommentType};

impl Comment {
    /// Attach a reply, keeping replies ordered by creation time.
    /// Returns the index the reply landed at.
    pub fn add_reply(&mut self, mut reply: Comment) -> usize {
        reply.thread_id = self.thread_id.clone();
        let idx = self
            .replies
            .partition_point(|r| r.created_at <= reply.created_at);
        self.replies.insert(idx, reply);
        idx
    }

    /// Create a reply from `author`. Reply inherits the parent's anchor.
    pub fn reply(&mut self, ids: &dyn IdGenerator, author: &str, text: &str) -> &Comment {
        let reply = Comment::from_identity(
            ids.next_id(),
            self.thread_id.clone(),
            author,
            now(),
            text,
            self.line,
        );
        let idx = self.add_reply(reply);
        &self.replies[idx]
    }

    /// Pending -> Accepted. The comment is completed and resolved.
    pub fn accept(&mut self) -> Result<(), ApplyError> {
        self.transition(AcceptanceState::Accepted)?;
        self.status = CommentStatus::Completed;
        self.resolved = true;
        Ok(())
    }

    /// Pending -> Rejected. The comment is resolved.
    pub fn reject(&mut self) -> Result<(), ApplyError> {
        self.transition(AcceptanceState::Rejected)?;
        self.resolved = true;
        Ok(())
    }

    fn transition(&mut self, to: AcceptanceState) -> Result<(), ApplyError> {
        let id = self.id.clone();
        let suggestion = self
            .suggestion
            .as_mut()
            .ok_or_else(|| ApplyError::NotASuggestion(id.clone()))?;
        if !suggestion.is_pending() {
            return Err(ApplyError::NotPending {
                id,
                state: suggestion.acceptance,
            });
        }
        suggestion.acceptance = to;
        Ok(())
    }
}

/// Find a comment anywhere in the forest
pub fn find_by_id<'a>(threads: &'a [Comment], id: &str) -> Option<&'a Comment> {
    for comment in threads {
        if comment.id == id {
            return Some(comment);
        }
        if let Some(found) = find_by_id(&comment.replies, id) {
            return Some(found);
        }
    }
    None
}

pub fn find_by_id_mut<'a>(threads: &'a mut [Comment], id: &str) -> Option<&'a mut Comment> {
    for comment in threads.iter_mut() {
        if comment.id == id {
            return Some(comment);
        }
        if let Some(found) = find_by_id_mut(&mut comment.replies, id) {
            return Some(found);
        }
    }
    None
}

/// Root comment of a thread
pub fn find_by_thread_id<'a>(threads: &'a [Comment], thread_id: &str) -> Option<&'a Comment> {
    threads.iter().find(|c| c.thread_id == thread_id)
}

fn find_by_thread_id_mut<'a>(threads: &'a mut [Comment], thread_id: &str) -> Option<&'a mut Comment> {
    threads.iter_mut().find(|c| c.thread_id == thread_id)
}

/// Depth-first flattening: each root, then its replies
pub fn get_all_comments(threads: &[Comment]) -> Vec<&Comment> {
    let mut out = Vec::new();
    for comment in threads {
        collect(comment, &mut out);
    }
    out
}

fn collect<'a>(comment: &'a Comment, out: &mut Vec<&'a Comment>) {
    out.push(comment);
    for reply in &comment.replies {
        collect(reply, out);
    }
}

/// Visit every comment in the forest mutably, depth-first
pub fn for_each_comment_mut(threads: &mut [Comment], f: &mut dyn FnMut(&mut Comment)) {
    for comment in threads.iter_mut() {
        f(comment);
        for_each_comment_mut(&mut comment.replies, f);
    }
}

/// Group flat comments into threads by thread id.
///
/// A comment whose id equals its thread id is a root; everything else is a
/// reply to that root. A reply whose root is missing is promoted to a root
/// of its own thread. Roots keep their input order.
pub fn build_threads(flat: Vec<Comment>) -> Vec<Comment> {
    let (roots, replies): (Vec<Comment>, Vec<Comment>) =
        flat.into_iter().partition(|c| c.id == c.thread_id);

    let mut threads = roots;
    for reply in replies {
        match find_by_thread_id_mut(&mut threads, &reply.thread_id) {
            Some(root) => {
                root.add_reply(reply);
            }
            None => {
                warn!(
                    "Reply {} has no root in thread {}, promoting it",
                    reply.id, reply.thread_id
                );
                threads.push(reply);
            }
        }
    }

    debug!("Built {} thread(s)", threads.len());
    threads
}

/// Mark every comment in a thread resolved. Returns false if no such thread.
pub fn resolve_thread(threads: &mut [Comment], thread_id: &str) -> bool {
    set_thread_resolved(threads, thread_id, true)
}

/// Explicitly reopen a resolved thread
pub fn unresolve_thread(threads: &mut [Comment], thread_id: &str) -> bool {
    set_thread_resolved(threads, thread_id, false)
}

fn set_thread_resolved(threads: &mut [Comment], thread_id: &str, resolved: bool) -> bool {
    match find_by_thread_id_mut(threads, thread_id) {
        Some(root) => {
            for_each_comment_mut(std::slice::from_mut(root), &mut |c| c.resolved = resolved);
            true
        }
        None => false,
    }
}

/// Every pending suggestion in the forest, depth-first
pub fn pending_suggestions(threads: &[Comment]) -> Vec<Comment> {
    get_all_comments(threads)
        .into_iter()
        .filter(|c| c.is_pending_suggestion())
        .cloned()
        .collect()
}

/// Criteria for selecting comments out of the flattened forest.
/// Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct CommentFilter {
    pub author: Option<String>,
    pub comment_type: Option<CommentType>,
    pub status: Option<CommentStatus>,
    pub resolved: Option<bool>,
    pub pending_suggestions_only: bool,
    /// Case-insensitive substring of the comment text
    pub text: Option<String>,
}

impl CommentFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn author(mut self, author: &str) -> Self {
        self.author = Some(author.to_string());
        self
    }

    pub fn comment_type(mut self, comment_type: CommentType) -> Self {
        self.comment_type = Some(comment_type);
        self
    }

    pub fn status(mut self, status: CommentStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn resolved(mut self, resolved: bool) -> Self {
        self.resolved = Some(resolved);
        self
    }

    pub fn pending_suggestions(mut self) -> Self {
        self.pending_suggestions_only = true;
        self
    }

    pub fn text(mut self, needle: &str) -> Self {
        self.text = Some(needle.to_lowercase());
        self
    }

    pub fn matches(&self, comment: &Comment) -> bool {
        if let Some(author) = &self.author {
            if &comment.author != author {
                return false;
            }
        }
        if self.comment_type.is_some() && comment.comment_type != self.comment_type {
            return false;
        }
        if let Some(status) = self.status {
            if comment.status != status {
                return false;
            }
        }
        if let Some(resolved) = self.resolved {
            if comment.resolved != resolved {
                return false;
            }
        }
        if self.pending_suggestions_only && !comment.is_pending_suggestion() {
            return false;
        }
        if let Some(needle) = &self.text {
            if !comment.text.to_lowercase().contains(needle.as_str()) {
                return false;
            }
        }
        true
    }

    pub fn apply<'a>(&self, threads: &'a [Comment]) -> Vec<&'a Comment> {
        get_all_comments(threads)
            .into_iter()
            .filter(|c| self.matches(c))
            .collect()
    }
}
