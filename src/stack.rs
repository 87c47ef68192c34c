/******************************************************************************/
/*                                                                            */
/* SPDX-License-Identifier: MIT                                               */
/* Copyright (c) [2023] Serokell <hi@serokell.io>                             */
/*                                                                            */
/******************************************************************************/

//! Type stacks.
//!
//! [Stack] keeps the top of the stack at the end of the underlying vector, so
//! slice patterns read `[.., second, top]`. Indexing is relative to the top:
//! `stack[0]` is the top element.

use std::fmt;
use std::ops::{Index, IndexMut};

use crate::ast::Ty;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stack<T>(Vec<T>);

pub type TypeStack = Stack<Ty>;

impl<T> Default for Stack<T> {
    fn default() -> Self {
        Stack(Vec::new())
    }
}

impl<T> Stack<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, x: T) {
        self.0.push(x)
    }

    pub fn pop(&mut self) -> Option<T> {
        self.0.pop()
    }

    pub fn top(&self) -> Option<&T> {
        self.0.last()
    }

    /// Elements, bottom first, top last.
    pub fn as_slice(&self) -> &[T] {
        &self.0
    }

    /// Iterate from the top down.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.0.iter().rev()
    }

    /// Remove `n` top elements. Panics if the stack is shorter.
    pub fn drop_top(&mut self, n: usize) {
        self.0.truncate(self.0.len() - n);
    }

    /// Split off `n` top elements as a new stack. Panics if the stack is
    /// shorter.
    pub fn split_off(&mut self, n: usize) -> Stack<T> {
        Stack(self.0.split_off(self.0.len() - n))
    }

    /// Put all elements of `other` on top, keeping their order.
    pub fn append(&mut self, other: &mut Stack<T>) {
        self.0.append(&mut other.0)
    }

    /// Remove the element at depth `i`, 0 being the top.
    pub fn remove(&mut self, i: usize) -> T {
        let idx = self.0.len() - 1 - i;
        self.0.remove(idx)
    }

    /// Insert an element so that it ends up at depth `i`, 0 being the top.
    pub fn insert(&mut self, i: usize, x: T) {
        let idx = self.0.len() - i;
        self.0.insert(idx, x)
    }

    pub fn swap(&mut self, i: usize, j: usize) {
        let len = self.0.len();
        self.0.swap(len - 1 - i, len - 1 - j)
    }
}

impl<T> Index<usize> for Stack<T> {
    type Output = T;

    fn index(&self, i: usize) -> &T {
        &self.0[self.0.len() - 1 - i]
    }
}

impl<T> IndexMut<usize> for Stack<T> {
    fn index_mut(&mut self, i: usize) -> &mut T {
        let len = self.0.len();
        &mut self.0[len - 1 - i]
    }
}

/// Elements are taken bottom first.
impl<T> FromIterator<T> for Stack<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Stack(iter.into_iter().collect())
    }
}

impl<T> From<Vec<T>> for Stack<T> {
    fn from(v: Vec<T>) -> Self {
        Stack(v)
    }
}

/// Printed top first, e.g. `[ int : string ]` for a stack with `int` on top.
impl<T: fmt::Display> fmt::Display for Stack<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "[]");
        }
        write!(f, "[ ")?;
        for (i, x) in self.iter().enumerate() {
            if i > 0 {
                write!(f, " : ")?;
            }
            write!(f, "{x}")?;
        }
        write!(f, " ]")
    }
}

/// Result of typechecking: either a stack, or a failure (`FAILWITH`, `NEVER`)
/// with the type of the failing value.
///
/// `level` counts the blocks the failure has propagated out of. It is 0
/// right after the failing instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailingTypeStack {
    Ok(TypeStack),
    Failed { ty: Ty, level: usize },
}

impl Default for FailingTypeStack {
    fn default() -> Self {
        FailingTypeStack::Ok(Stack::new())
    }
}

impl FailingTypeStack {
    /// Get the stack, or `err` if typechecking has already failed.
    pub fn access_mut<E>(&mut self, err: E) -> Result<&mut TypeStack, E> {
        match self {
            FailingTypeStack::Ok(stack) => Ok(stack),
            FailingTypeStack::Failed { .. } => Err(err),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, FailingTypeStack::Failed { .. })
    }

    /// Mark one more block boundary crossed by a failure.
    pub fn leave_block(&mut self) {
        if let FailingTypeStack::Failed { level, .. } = self {
            *level += 1;
        }
    }
}

impl fmt::Display for FailingTypeStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailingTypeStack::Ok(stack) => stack.fmt(f),
            FailingTypeStack::Failed { ty, .. } => write!(f, "failed with {ty}"),
        }
    }
}

/// Build a [TypeStack]. Elements are listed bottom first, the last one is the
/// top. Bare [crate::ast::Type]s and [Ty]s are both accepted.
macro_rules! tc_stk {
    [$($e:expr),* $(,)?] => {
        $crate::stack::Stack::from(vec![$($crate::ast::Ty::from($e)),*])
    };
}

pub(crate) use tc_stk;
