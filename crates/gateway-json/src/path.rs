use std::fmt;

/// One segment of a [`Path`]: either a field alias or a list index.
///
/// Mirrors the shape GraphQL error paths are serialized as: a mixed
/// sequence of strings and integers.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum PathElement {
    Field(String),
    Index(usize),
}

impl fmt::Display for PathElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathElement::Field(name) => f.write_str(name),
            PathElement::Index(i) => write!(f, "{i}"),
        }
    }
}

impl From<&str> for PathElement {
    fn from(value: &str) -> Self {
        PathElement::Field(value.to_string())
    }
}

impl From<String> for PathElement {
    fn from(value: String) -> Self {
        PathElement::Field(value)
    }
}

impl From<usize> for PathElement {
    fn from(value: usize) -> Self {
        PathElement::Index(value)
    }
}

/// An ordered list of [`PathElement`]s from the response root down to a field.
///
/// Used both as a plan's `insertion_point` and as an error's `path`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Path(pub Vec<PathElement>);

impl Path {
    pub fn empty() -> Self {
        Path(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn join(&self, element: impl Into<PathElement>) -> Path {
        let mut out = self.0.clone();
        out.push(element.into());
        Path(out)
    }

    pub fn extend(&self, other: &Path) -> Path {
        let mut out = self.0.clone();
        out.extend(other.0.iter().cloned());
        Path(out)
    }

    pub fn as_slice(&self) -> &[PathElement] {
        &self.0
    }
}

impl FromIterator<PathElement> for Path {
    fn from_iter<T: IntoIterator<Item = PathElement>>(iter: T) -> Self {
        Path(iter.into_iter().collect())
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, element) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{element}")?;
        }
        Ok(())
    }
}
