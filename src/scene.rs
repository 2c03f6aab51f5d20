use crate::graph::NodeIdx;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(usize);

/// What a pointer event landed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitTarget {
    Node(NodeIdx),
    /// Edge `index` of the scope owned by `flow`.
    Edge { flow: NodeIdx, index: usize },
    /// Empty canvas.
    Graph,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Icon {
    Flow,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Group {
        translate: (f32, f32),
    },
    Rect {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        radius: f32,
    },
    Text {
        x: f32,
        y: f32,
        text: String,
        font_size: Option<f32>,
    },
    Line {
        from: (f32, f32),
        to: (f32, f32),
    },
    Polyline {
        points: Vec<(f32, f32)>,
    },
    Icon {
        icon: Icon,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    },
}

#[derive(Debug, Clone)]
pub struct Element {
    pub primitive: Primitive,
    pub class: String,
    pub title: Option<String>,
    pub hidden: bool,
    pub target: Option<HitTarget>,
    pub parent: Option<ElementId>,
    pub children: Vec<ElementId>,
}

#[derive(Debug, Clone)]
pub struct Scene {
    elements: Vec<Element>,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        Self {
            elements: vec![Element {
                primitive: Primitive::Group {
                    translate: (0.0, 0.0),
                },
                class: "main graph".to_string(),
                title: None,
                hidden: false,
                target: Some(HitTarget::Graph),
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    pub fn root(&self) -> ElementId {
        ElementId(0)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn element(&self, id: ElementId) -> &Element {
        &self.elements[id.0]
    }

    pub fn add(&mut self, parent: ElementId, primitive: Primitive, class: &str) -> ElementId {
        let id = ElementId(self.elements.len());
        self.elements.push(Element {
            primitive,
            class: class.to_string(),
            title: None,
            hidden: false,
            target: None,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.elements[parent.0].children.push(id);
        id
    }

    pub fn group(&mut self, parent: ElementId, class: &str) -> ElementId {
        self.add(
            parent,
            Primitive::Group {
                translate: (0.0, 0.0),
            },
            class,
        )
    }

    /// Replaces the class attribute wholesale.
    pub fn set_class(&mut self, id: ElementId, class: impl Into<String>) {
        self.elements[id.0].class = class.into();
    }

    pub fn set_title(&mut self, id: ElementId, title: impl Into<String>) {
        self.elements[id.0].title = Some(title.into());
    }

    pub fn set_hidden(&mut self, id: ElementId, hidden: bool) {
        self.elements[id.0].hidden = hidden;
    }

    pub fn set_target(&mut self, id: ElementId, target: HitTarget) {
        self.elements[id.0].target = Some(target);
    }

    pub fn set_primitive(&mut self, id: ElementId, primitive: Primitive) {
        self.elements[id.0].primitive = primitive;
    }

    /// Moves a group; other primitives are left alone.
    pub fn set_translate(&mut self, id: ElementId, x: f32, y: f32) {
        if let Primitive::Group { translate } = &mut self.elements[id.0].primitive {
            *translate = (x, y);
        }
    }

    pub fn set_rect_size(&mut self, id: ElementId, w: f32, h: f32) {
        if let Primitive::Rect { width, height, .. } = &mut self.elements[id.0].primitive {
            *width = w;
            *height = h;
        }
    }

    /// Offset of an element's local origin in scene coordinates.
    pub fn origin_of(&self, id: ElementId) -> (f32, f32) {
        let mut origin = (0.0, 0.0);
        let mut current = self.elements[id.0].parent;
        while let Some(parent) = current {
            if let Primitive::Group { translate } = self.elements[parent.0].primitive {
                origin.0 += translate.0;
                origin.1 += translate.1;
            }
            current = self.elements[parent.0].parent;
        }
        if let Primitive::Group { translate } = self.elements[id.0].primitive {
            origin.0 += translate.0;
            origin.1 += translate.1;
        }
        origin
    }

    /// Topmost target under a scene point. Later siblings are drawn above
    /// earlier ones; hidden subtrees are ignored.
    pub fn hit_test(&self, x: f32, y: f32, edge_tolerance: f32) -> HitTarget {
        self.hit_element(self.root(), (0.0, 0.0), (x, y), edge_tolerance, None)
            .unwrap_or(HitTarget::Graph)
    }

    fn hit_element(
        &self,
        id: ElementId,
        offset: (f32, f32),
        point: (f32, f32),
        tolerance: f32,
        owner: Option<HitTarget>,
    ) -> Option<HitTarget> {
        let element = &self.elements[id.0];
        if element.hidden {
            return None;
        }
        let owner = element.target.or(owner);
        let local = (point.0 - offset.0, point.1 - offset.1);

        match &element.primitive {
            Primitive::Group { translate } => {
                let inner = (offset.0 + translate.0, offset.1 + translate.1);
                element
                    .children
                    .iter()
                    .rev()
                    .find_map(|&child| self.hit_element(child, inner, point, tolerance, owner))
            }
            Primitive::Rect {
                x,
                y,
                width,
                height,
                ..
            } => (local.0 >= *x
                && local.0 <= x + width
                && local.1 >= *y
                && local.1 <= y + height)
                .then_some(owner)
                .flatten(),
            Primitive::Line { from, to } => {
                (segment_distance(local, *from, *to) <= tolerance).then_some(owner).flatten()
            }
            Primitive::Polyline { points } => points
                .windows(2)
                .any(|pair| segment_distance(local, pair[0], pair[1]) <= tolerance)
                .then_some(owner)
                .flatten(),
            Primitive::Text { .. } | Primitive::Icon { .. } => None,
        }
    }
}

fn segment_distance(p: (f32, f32), a: (f32, f32), b: (f32, f32)) -> f32 {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len_sq = dx * dx + dy * dy;
    let t = if len_sq == 0.0 {
        0.0
    } else {
        (((p.0 - a.0) * dx + (p.1 - a.1) * dy) / len_sq).clamp(0.0, 1.0)
    };
    let (cx, cy) = (a.0 + t * dx, a.1 + t * dy);
    ((p.0 - cx).powi(2) + (p.1 - cy).powi(2)).sqrt()
}
