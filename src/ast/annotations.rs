/******************************************************************************/
/*                                                                            */
/* SPDX-License-Identifier: MIT                                               */
/* Copyright (c) [2023] Serokell <hi@serokell.io>                             */
/*                                                                            */
/******************************************************************************/

//! Annotation lists attached to primitive applications.

use std::borrow::Cow;

use crate::lexer::Annotation;

/// An ordered list of annotations. Order is preserved because it is visible in
/// the binary encoding.
#[derive(Clone, Eq, PartialEq)]
pub struct Annotations<'a>(Vec<Annotation<'a>>);

pub const NO_ANNS: Annotations = Annotations::new();

/// Errors arising from malformed annotation lists.
#[derive(Debug, PartialEq, Eq, Clone, thiserror::Error)]
pub enum AnnotationError {
    #[error("at most one {kind} annotation is allowed, found {count}")]
    TooMany { kind: &'static str, count: usize },
    #[error("unexpected {kind} annotation: {ann}")]
    Unexpected { kind: &'static str, ann: String },
}

impl Default for Annotations<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Annotations<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::fmt::Display for Annotations<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for ann in self.iter() {
            if !first {
                write!(f, " ")?;
            }
            first = false;
            write!(f, "{ann}")?;
        }
        Ok(())
    }
}

impl<'a> Annotations<'a> {
    pub const fn new() -> Self {
        Annotations(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = &Annotation<'a>> {
        self.0.iter()
    }

    pub fn push(&mut self, ann: Annotation<'a>) {
        self.0.push(ann)
    }

    /// Field annotations, without the leading `%`. Special `%@` is not
    /// included.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.iter().filter_map(|x| match x {
            Annotation::Field(s) => Some(s.as_ref()),
            _ => None,
        })
    }

    /// Variable annotations, without the leading `@`. Special `@%` and `@%%`
    /// are not included.
    pub fn vars(&self) -> impl Iterator<Item = &str> {
        self.0.iter().filter_map(|x| match x {
            Annotation::Variable(s) => Some(s.as_ref()),
            _ => None,
        })
    }

    /// Type annotations, without the leading `:`.
    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.0.iter().filter_map(|x| match x {
            Annotation::Type(s) => Some(s.as_ref()),
            _ => None,
        })
    }

    fn single<'b>(
        kind: &'static str,
        mut it: impl Iterator<Item = &'b str>,
    ) -> Result<Option<&'b str>, AnnotationError> {
        let first = it.next();
        let rest = it.count();
        if rest > 0 {
            return Err(AnnotationError::TooMany {
                kind,
                count: rest + 1,
            });
        }
        Ok(first)
    }

    /// Get at most one field annotation, failing if there are more.
    pub fn get_single_field_ann(&self) -> Result<Option<&str>, AnnotationError> {
        Self::single("field", self.fields())
    }

    /// Get at most one type annotation, failing if there are more.
    pub fn get_single_type_ann(&self) -> Result<Option<&str>, AnnotationError> {
        Self::single("type", self.types())
    }

    /// Get at most one variable annotation, failing if there are more.
    pub fn get_single_var_ann(&self) -> Result<Option<&str>, AnnotationError> {
        Self::single("variable", self.vars())
    }

    /// Keep only annotations satisfying the predicate.
    pub fn retain(&self, f: impl Fn(&Annotation<'a>) -> bool) -> Self {
        self.0.iter().filter(|x| f(x)).cloned().collect()
    }

    /// Copy of the list with every annotation made owned.
    pub fn into_owned(self) -> Annotations<'static> {
        self.0.into_iter().map(Annotation::into_owned).collect()
    }

    /// Build a list from optional variable, field and type annotation names.
    pub fn from_parts(
        var: Option<&str>,
        field: Option<&str>,
        ty: Option<&str>,
    ) -> Annotations<'static> {
        let own = |s: &str| Cow::Owned(s.to_owned());
        ty.map(|t| Annotation::Type(own(t)))
            .into_iter()
            .chain(field.map(|f| Annotation::Field(own(f))))
            .chain(var.map(|v| Annotation::Variable(own(v))))
            .collect()
    }
}

impl<'a, T> From<T> for Annotations<'a>
where
    T: AsRef<[Annotation<'a>]>,
{
    fn from(x: T) -> Self {
        Annotations(Vec::from(x.as_ref()))
    }
}

impl<'a> FromIterator<Annotation<'a>> for Annotations<'a> {
    fn from_iter<T: IntoIterator<Item = Annotation<'a>>>(iter: T) -> Self {
        Annotations(Vec::from_iter(iter))
    }
}

impl<'a> Extend<Annotation<'a>> for Annotations<'a> {
    fn extend<T: IntoIterator<Item = Annotation<'a>>>(&mut self, iter: T) {
        self.0.extend(iter)
    }
}

impl<'a> IntoIterator for Annotations<'a> {
    type Item = Annotation<'a>;
    type IntoIter = std::vec::IntoIter<Annotation<'a>>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
