use crate::error::{CalwaveError, CalwaveResult};
use serde_json::{Map, Value};

/// A node in the analysis settings tree
///
/// Settings are a dynamically shaped document (the shell builds its
/// parameter forms from them, and saved sessions restore them), modeled as a
/// typed tagged tree instead of loose maps: leaves are scalars, text, or
/// toggles; interior nodes are named groups or ordered lists. Paths are
/// slash-separated, with list positions addressed by index, e.g.
/// `"Filter/Cutoffs/0"`.
///
/// # Example
/// ```
/// use calwave::settings::SettingNode;
///
/// let settings = SettingNode::group([
///     ("Sampling rate", SettingNode::Scalar(10.0)),
///     (
///         "Filter",
///         SettingNode::group([(
///             "Cutoffs",
///             SettingNode::List(vec![
///                 SettingNode::Scalar(0.03),
///                 SettingNode::Scalar(0.3),
///             ]),
///         )]),
///     ),
/// ]);
///
/// assert_eq!(settings.scalar("Filter/Cutoffs/1").unwrap(), 0.3);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum SettingNode {
    Scalar(f64),
    Text(String),
    Toggle(bool),
    Group(Vec<(String, SettingNode)>),
    List(Vec<SettingNode>),
}

impl SettingNode {
    /// Build a group node from name/child pairs
    pub fn group<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, SettingNode)>,
    {
        Self::Group(
            entries
                .into_iter()
                .map(|(name, node)| (name.into(), node))
                .collect(),
        )
    }

    /// Kind label used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Scalar(_) => "scalar",
            Self::Text(_) => "text",
            Self::Toggle(_) => "toggle",
            Self::Group(_) => "group",
            Self::List(_) => "list",
        }
    }

    /// Look up the node at a slash-separated path
    ///
    /// # Errors
    /// Returns `CalwaveError::SettingsPath` if any segment is missing or a
    /// list index does not parse.
    pub fn get(&self, path: &str) -> CalwaveResult<&SettingNode> {
        let mut node = self;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            node = match node {
                Self::Group(entries) => entries
                    .iter()
                    .find(|(name, _)| name == segment)
                    .map(|(_, child)| child)
                    .ok_or_else(|| CalwaveError::SettingsPath(path.to_string()))?,
                Self::List(items) => {
                    let index: usize = segment
                        .parse()
                        .map_err(|_| CalwaveError::SettingsPath(path.to_string()))?;
                    items
                        .get(index)
                        .ok_or_else(|| CalwaveError::SettingsPath(path.to_string()))?
                }
                _ => return Err(CalwaveError::SettingsPath(path.to_string())),
            };
        }
        Ok(node)
    }

    fn get_mut(&mut self, path: &str) -> CalwaveResult<&mut SettingNode> {
        let mut node = self;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            node = match node {
                Self::Group(entries) => entries
                    .iter_mut()
                    .find(|(name, _)| name == segment)
                    .map(|(_, child)| child)
                    .ok_or_else(|| CalwaveError::SettingsPath(path.to_string()))?,
                Self::List(items) => {
                    let index: usize = segment
                        .parse()
                        .map_err(|_| CalwaveError::SettingsPath(path.to_string()))?;
                    items
                        .get_mut(index)
                        .ok_or_else(|| CalwaveError::SettingsPath(path.to_string()))?
                }
                _ => return Err(CalwaveError::SettingsPath(path.to_string())),
            };
        }
        Ok(node)
    }

    /// Get a scalar leaf value
    pub fn scalar(&self, path: &str) -> CalwaveResult<f64> {
        match self.get(path)? {
            Self::Scalar(value) => Ok(*value),
            other => Err(CalwaveError::SettingsKind(format!(
                "'{}' is a {}, not a scalar",
                path,
                other.kind()
            ))),
        }
    }

    /// Get a text leaf value
    pub fn text(&self, path: &str) -> CalwaveResult<&str> {
        match self.get(path)? {
            Self::Text(value) => Ok(value),
            other => Err(CalwaveError::SettingsKind(format!(
                "'{}' is a {}, not text",
                path,
                other.kind()
            ))),
        }
    }

    /// Get a toggle leaf value
    pub fn toggle(&self, path: &str) -> CalwaveResult<bool> {
        match self.get(path)? {
            Self::Toggle(value) => Ok(*value),
            other => Err(CalwaveError::SettingsKind(format!(
                "'{}' is a {}, not a toggle",
                path,
                other.kind()
            ))),
        }
    }

    /// Replace the leaf at `path` with a new value of the same kind
    ///
    /// Binding a form field back into the tree must never change a leaf's
    /// kind; interior nodes cannot be replaced wholesale.
    ///
    /// # Errors
    /// `CalwaveError::SettingsPath` for missing paths,
    /// `CalwaveError::SettingsKind` for kind mismatches or interior targets.
    pub fn set(&mut self, path: &str, value: SettingNode) -> CalwaveResult<()> {
        let target = self.get_mut(path)?;
        let same_kind = matches!(
            (&*target, &value),
            (Self::Scalar(_), Self::Scalar(_))
                | (Self::Text(_), Self::Text(_))
                | (Self::Toggle(_), Self::Toggle(_))
        );
        if !same_kind {
            return Err(CalwaveError::SettingsKind(format!(
                "Cannot replace {} at '{}' with {}",
                target.kind(),
                path,
                value.kind()
            )));
        }
        *target = value;
        Ok(())
    }

    /// Serialize to a JSON value (groups become objects, lists arrays)
    pub fn to_value(&self) -> Value {
        match self {
            Self::Scalar(value) => Value::from(*value),
            Self::Text(value) => Value::String(value.clone()),
            Self::Toggle(value) => Value::Bool(*value),
            Self::Group(entries) => {
                let mut map = Map::new();
                for (name, child) in entries {
                    map.insert(name.clone(), child.to_value());
                }
                Value::Object(map)
            }
            Self::List(items) => Value::Array(items.iter().map(Self::to_value).collect()),
        }
    }

    /// Rebuild a tree from a JSON value
    ///
    /// # Errors
    /// Returns `CalwaveError::SettingsKind` for JSON values with no tree
    /// counterpart (null, non-finite numbers).
    pub fn from_value(value: &Value) -> CalwaveResult<SettingNode> {
        match value {
            Value::Number(n) => n
                .as_f64()
                .map(Self::Scalar)
                .ok_or_else(|| CalwaveError::SettingsKind(format!("Unrepresentable number: {n}"))),
            Value::String(s) => Ok(Self::Text(s.clone())),
            Value::Bool(b) => Ok(Self::Toggle(*b)),
            Value::Object(map) => {
                let mut entries = Vec::with_capacity(map.len());
                for (name, child) in map {
                    entries.push((name.clone(), Self::from_value(child)?));
                }
                Ok(Self::Group(entries))
            }
            Value::Array(items) => {
                let mut children = Vec::with_capacity(items.len());
                for item in items {
                    children.push(Self::from_value(item)?);
                }
                Ok(Self::List(children))
            }
            Value::Null => Err(CalwaveError::SettingsKind(
                "Settings trees have no null values".to_string(),
            )),
        }
    }

    /// Walk the tree depth-first, reporting each node with its full path
    ///
    /// This is the one traversal used for both serialization helpers and
    /// form binding in the shell; visitors override only the callbacks they
    /// care about.
    pub fn walk(&self, visitor: &mut dyn SettingsVisitor) {
        self.walk_inner("", visitor);
    }

    fn walk_inner(&self, path: &str, visitor: &mut dyn SettingsVisitor) {
        match self {
            Self::Scalar(value) => visitor.scalar(path, *value),
            Self::Text(value) => visitor.text(path, value),
            Self::Toggle(value) => visitor.toggle(path, *value),
            Self::Group(entries) => {
                visitor.enter_group(path);
                for (name, child) in entries {
                    child.walk_inner(&join_path(path, name), visitor);
                }
                visitor.leave_group(path);
            }
            Self::List(items) => {
                visitor.enter_list(path);
                for (index, child) in items.iter().enumerate() {
                    child.walk_inner(&join_path(path, &index.to_string()), visitor);
                }
                visitor.leave_list(path);
            }
        }
    }
}

fn join_path(path: &str, segment: &str) -> String {
    if path.is_empty() {
        segment.to_string()
    } else {
        format!("{path}/{segment}")
    }
}

/// Visitor over a settings tree; all callbacks default to no-ops
pub trait SettingsVisitor {
    fn scalar(&mut self, _path: &str, _value: f64) {}
    fn text(&mut self, _path: &str, _value: &str) {}
    fn toggle(&mut self, _path: &str, _value: bool) {}
    fn enter_group(&mut self, _path: &str) {}
    fn leave_group(&mut self, _path: &str) {}
    fn enter_list(&mut self, _path: &str) {}
    fn leave_list(&mut self, _path: &str) {}
}
