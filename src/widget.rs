//! Camera configuration tree.
//!
//! `gp_camera_get_config` yields an n-ary tree rooted at a window node. The
//! tree is copied into owned [`Widget`] values, edited by the caller and
//! written back with [`crate::Camera::set_config`]. A tree reflects the device
//! state at the time it was read; writing back an old tree reverts any change
//! made on the device since.

use std::ffi::c_int;
use std::ops::Deref;

use crate::error::{CameraError, Result};

/// libgphoto2 `CameraWidgetType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WidgetKind {
    /// Root of a configuration tree.
    Window,
    /// Grouping node.
    Section,
    /// Free text.
    Text,
    /// Bounded float.
    Range,
    /// On/off switch.
    Toggle,
    /// One-of choice shown as radio buttons.
    Radio,
    /// One-of choice shown as a menu.
    Menu,
    /// Action without a value.
    Button,
    /// Unix timestamp.
    Date,
}

impl WidgetKind {
    /// Maps a raw `CameraWidgetType` value.
    pub const fn from_raw(raw: c_int) -> Option<Self> {
        Some(match raw {
            0 => Self::Window,
            1 => Self::Section,
            2 => Self::Text,
            3 => Self::Range,
            4 => Self::Toggle,
            5 => Self::Radio,
            6 => Self::Menu,
            7 => Self::Button,
            8 => Self::Date,
            _ => return None,
        })
    }

    /// Whether nodes of this kind hold children rather than a value.
    pub const fn is_container(self) -> bool {
        matches!(self, Self::Window | Self::Section)
    }
}

/// Payload of a widget node.
#[derive(Debug, Clone, PartialEq)]
pub enum WidgetBody {
    /// Root container.
    Window(Vec<Widget>),
    /// Nested container.
    Section(Vec<Widget>),
    /// Text setting.
    Text(String),
    /// Float setting with bounds and step.
    Range {
        /// Current value.
        value: f32,
        /// Lower bound.
        min: f32,
        /// Upper bound.
        max: f32,
        /// Increment.
        step: f32,
    },
    /// Boolean setting.
    Toggle(bool),
    /// Choice setting shown as radio buttons.
    Radio {
        /// Current choice.
        value: String,
        /// Offered choices.
        choices: Vec<String>,
    },
    /// Choice setting shown as a menu.
    Menu {
        /// Current choice.
        value: String,
        /// Offered choices.
        choices: Vec<String>,
    },
    /// Action trigger.
    Button,
    /// Timestamp setting.
    Date(i64),
}

/// A value that can be read from or written to a leaf widget.
#[derive(Debug, Clone, PartialEq)]
pub enum WidgetValue {
    /// For [`WidgetKind::Text`].
    Text(String),
    /// For [`WidgetKind::Range`].
    Float(f32),
    /// For [`WidgetKind::Toggle`].
    Toggle(bool),
    /// For [`WidgetKind::Radio`] and [`WidgetKind::Menu`].
    Choice(String),
    /// For [`WidgetKind::Date`].
    Date(i64),
}

/// One node of a configuration tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Widget {
    name: String,
    label: String,
    read_only: bool,
    body: WidgetBody,
}

impl Widget {
    /// Create a node.
    pub fn new<N: Into<String>, L: Into<String>>(name: N, label: L, body: WidgetBody) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            read_only: false,
            body,
        }
    }

    /// Mark the node as read-only.
    #[must_use]
    pub const fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Machine name, unique within a tree.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human readable label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Whether the device refuses writes to this node.
    pub const fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Node payload.
    pub const fn body(&self) -> &WidgetBody {
        &self.body
    }

    /// Node kind.
    pub const fn kind(&self) -> WidgetKind {
        match self.body {
            WidgetBody::Window(_) => WidgetKind::Window,
            WidgetBody::Section(_) => WidgetKind::Section,
            WidgetBody::Text(_) => WidgetKind::Text,
            WidgetBody::Range { .. } => WidgetKind::Range,
            WidgetBody::Toggle(_) => WidgetKind::Toggle,
            WidgetBody::Radio { .. } => WidgetKind::Radio,
            WidgetBody::Menu { .. } => WidgetKind::Menu,
            WidgetBody::Button => WidgetKind::Button,
            WidgetBody::Date(_) => WidgetKind::Date,
        }
    }

    /// Direct children; empty for leaves.
    pub fn children(&self) -> &[Self] {
        match &self.body {
            WidgetBody::Window(children) | WidgetBody::Section(children) => children,
            _ => &[],
        }
    }

    /// Mutable access to direct children; empty for leaves.
    pub fn children_mut(&mut self) -> &mut [Self] {
        match &mut self.body {
            WidgetBody::Window(children) | WidgetBody::Section(children) => children,
            _ => &mut [],
        }
    }

    /// Number of direct children.
    pub fn count_children(&self) -> usize {
        self.children().len()
    }

    /// Direct child called `name`.
    pub fn child(&self, name: &str) -> Result<&Self> {
        self.children()
            .iter()
            .find(|child| child.name == name)
            .ok_or_else(|| CameraError::widget(format!("'{}' has no child named '{name}'", self.name)))
    }

    /// Direct child at `index`.
    pub fn child_at(&self, index: usize) -> Result<&Self> {
        self.children().get(index).ok_or_else(|| {
            CameraError::widget(format!(
                "child index {index} out of range for '{}' ({} children)",
                self.name,
                self.count_children()
            ))
        })
    }

    /// Depth-first search of the subtree, this node included.
    pub fn find(&self, name: &str) -> Option<&Self> {
        self.iter().find(|widget| widget.name == name)
    }

    /// Mutable depth-first search of the subtree, this node included.
    pub fn find_mut(&mut self, name: &str) -> Option<&mut Self> {
        if self.name == name {
            return Some(self);
        }
        self.children_mut().iter_mut().find_map(|child| child.find_mut(name))
    }

    /// Depth-first, pre-order iterator over the subtree.
    pub fn iter(&self) -> WidgetIter<'_> {
        WidgetIter { stack: vec![self] }
    }

    /// Current value of a leaf; `None` for containers and buttons.
    pub fn value(&self) -> Option<WidgetValue> {
        match &self.body {
            WidgetBody::Text(text) => Some(WidgetValue::Text(text.clone())),
            WidgetBody::Range { value, .. } => Some(WidgetValue::Float(*value)),
            WidgetBody::Toggle(on) => Some(WidgetValue::Toggle(*on)),
            WidgetBody::Radio { value, .. } | WidgetBody::Menu { value, .. } => {
                Some(WidgetValue::Choice(value.clone()))
            }
            WidgetBody::Date(ts) => Some(WidgetValue::Date(*ts)),
            WidgetBody::Window(_) | WidgetBody::Section(_) | WidgetBody::Button => None,
        }
    }

    /// Offered choices for radio and menu nodes.
    pub fn choices(&self) -> &[String] {
        match &self.body {
            WidgetBody::Radio { choices, .. } | WidgetBody::Menu { choices, .. } => choices,
            _ => &[],
        }
    }

    /// Assign a value. The value must match the node kind and, for ranges, its bounds.
    pub fn set_value(&mut self, value: WidgetValue) -> Result<()> {
        if self.read_only {
            return Err(CameraError::widget(format!("'{}' is read-only", self.name)));
        }
        let kind = self.kind();
        match (&mut self.body, value) {
            (WidgetBody::Text(text), WidgetValue::Text(new)) => *text = new,
            (WidgetBody::Toggle(on), WidgetValue::Toggle(new)) => *on = new,
            (WidgetBody::Date(ts), WidgetValue::Date(new)) => *ts = new,
            (WidgetBody::Radio { value, .. } | WidgetBody::Menu { value, .. }, WidgetValue::Choice(new)) => {
                *value = new;
            }
            (WidgetBody::Range { value, min, max, .. }, WidgetValue::Float(new)) => {
                if new < *min || new > *max {
                    return Err(CameraError::widget(format!(
                        "{new} is outside [{min}, {max}] for '{}'",
                        self.name
                    )));
                }
                *value = new;
            }
            (_, value) => {
                return Err(CameraError::widget(format!(
                    "cannot assign {value:?} to {kind:?} widget '{}'",
                    self.name
                )))
            }
        }
        Ok(())
    }
}

/// Iterator returned by [`Widget::iter`].
#[derive(Debug)]
pub struct WidgetIter<'a> {
    stack: Vec<&'a Widget>,
}

impl<'a> Iterator for WidgetIter<'a> {
    type Item = &'a Widget;

    fn next(&mut self) -> Option<Self::Item> {
        let widget = self.stack.pop()?;
        self.stack.extend(widget.children().iter().rev());
        Some(widget)
    }
}

/// Root of a configuration tree, as returned by [`crate::Camera::config`].
#[derive(Debug, Clone, PartialEq)]
pub struct WindowWidget(Widget);

impl WindowWidget {
    /// Wraps a tree read from the device. The root must be a window node.
    pub(crate) fn from_root(root: Widget) -> Result<Self> {
        if root.kind() == WidgetKind::Window {
            Ok(Self(root))
        } else {
            Err(CameraError::widget(format!(
                "configuration root '{}' is a {:?}, expected a window",
                root.name,
                root.kind()
            )))
        }
    }

    /// Set the value of the node called `name` anywhere in the tree.
    pub fn set(&mut self, name: &str, value: WidgetValue) -> Result<()> {
        self.0
            .find_mut(name)
            .ok_or_else(|| CameraError::widget(format!("no widget named '{name}'")))?
            .set_value(value)
    }

    /// Mutable access to the root's direct children. The root itself stays a
    /// window.
    pub fn children_mut(&mut self) -> &mut [Widget] {
        self.0.children_mut()
    }

    /// Unwraps the root node.
    pub fn into_inner(self) -> Widget {
        self.0
    }
}

impl Deref for WindowWidget {
    type Target = Widget;

    fn deref(&self) -> &Widget {
        &self.0
    }
}
