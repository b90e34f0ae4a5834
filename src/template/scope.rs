use super::instance::Template;
use super::value::Value;

/// One activation on the render call chain. Frames live on the Rust stack;
/// `parent` is the frame the template was written from.
#[derive(Clone, Copy)]
pub(crate) struct Frame<'a> {
    pub template: &'a Template,
    pub parent: Option<&'a Frame<'a>>,
}

/// Result of resolving an attribute name through the call chain.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Lookup {
    Found(Value),
    /// Declared and visible but never given a value.
    Unset,
    NotFound,
}

impl<'a> Frame<'a> {
    pub fn new(template: &'a Template, parent: Option<&'a Frame<'a>>) -> Self {
        Self { template, parent }
    }

    /// Resolve `name` walking outward from this frame.
    ///
    /// Declared arguments are visible in their own frame and through any
    /// run of anonymous or region frames nested inside it; a named template
    /// call hides its caller's declared arguments. Attributes added to
    /// templates without declared arguments stay visible all the way down.
    /// `i` and `i0` follow the same rule as declared arguments.
    pub fn lookup(&self, name: &str) -> Lookup {
        let mut formals_visible = true;
        let mut frame = Some(self);
        while let Some(f) = frame {
            let t = f.template;
            if let Some(index) = t.formal_index(name) {
                if formals_visible || !t.compiled.has_formal_args {
                    return t.slot(index).map_or(Lookup::Unset, |v| Lookup::Found(v.clone()));
                }
            }
            if formals_visible {
                if let Some(i) = t.iteration {
                    match name {
                        "i" => return Lookup::Found(Value::from(i)),
                        "i0" => return Lookup::Found(Value::from(i.saturating_sub(1))),
                        _ => {}
                    }
                }
            }
            formals_visible = formals_visible && t.compiled.is_transparent();
            frame = f.parent;
        }
        Lookup::NotFound
    }

    /// Template names from the outermost frame down to this one.
    pub fn call_stack(&self) -> Vec<String> {
        let mut names = Vec::new();
        let mut frame = Some(self);
        while let Some(f) = frame {
            names.push(f.template.name().to_string());
            frame = f.parent;
        }
        names.reverse();
        names
    }

    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut frame = self.parent;
        while let Some(f) = frame {
            depth += 1;
            frame = f.parent;
        }
        depth
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::template::group::TemplateGroup;

    fn group() -> TemplateGroup {
        let g = TemplateGroup::new("g");
        g.define_template("t", Some(&["x", "y"]), "<u()>").unwrap();
        g.define_template("u", Some(&[]), "<x>").unwrap();
        g.define_template("v", None, "<x>").unwrap();
        g.define_template("w", Some(&["x"]), "<x:{e | <e><y>}>").unwrap();
        g
    }

    #[test]
    fn named_call_hides_caller_arguments() {
        let g = group();
        let mut t = g.instance_of("t").unwrap();
        t.add("x", 1).unwrap();
        let u = g.instance_of("u").unwrap();
        let root = Frame::new(&t, None);
        let inner = Frame::new(&u, Some(&root));
        assert_eq!(root.lookup("x"), Lookup::Found(Value::Int(1)));
        assert_eq!(root.lookup("y"), Lookup::Unset);
        assert_eq!(inner.lookup("x"), Lookup::NotFound);
        assert_eq!(inner.call_stack(), vec!["/t".to_string(), "/u".to_string()]);
        assert_eq!(inner.depth(), 1);
    }

    #[test]
    fn anonymous_frames_see_through() {
        let g = group();
        let mut w = g.instance_of("w").unwrap();
        w.add("x", 1).unwrap();
        let sub_name = g.lookup("/w").unwrap().implicit_templates[0].name.clone();
        let mut sub = Template::new(g.lookup(&sub_name).unwrap(), g.clone(), g.clone());
        sub.set_slot(0, Value::Int(7));
        sub.iteration = Some(2);
        let root = Frame::new(&w, None);
        let inner = Frame::new(&sub, Some(&root));
        assert_eq!(inner.lookup("x"), Lookup::Found(Value::Int(1)));
        assert_eq!(inner.lookup("e"), Lookup::Found(Value::Int(7)));
        assert_eq!(inner.lookup("i"), Lookup::Found(Value::Int(2)));
        assert_eq!(inner.lookup("i0"), Lookup::Found(Value::Int(1)));
    }

    #[test]
    fn dynamic_attributes_stay_visible() {
        let g = group();
        let mut v = g.instance_of("v").unwrap();
        v.add("x", "dyn").unwrap();
        let u = g.instance_of("u").unwrap();
        let root = Frame::new(&v, None);
        let inner = Frame::new(&u, Some(&root));
        assert_eq!(inner.lookup("x"), Lookup::Found(Value::str("dyn")));
    }

    #[test]
    fn iteration_is_not_visible_in_nested_named_calls() {
        let g = group();
        let mut t = g.instance_of("t").unwrap();
        t.iteration = Some(1);
        let u = g.instance_of("u").unwrap();
        let root = Frame::new(&t, None);
        let inner = Frame::new(&u, Some(&root));
        assert_eq!(root.lookup("i"), Lookup::Found(Value::Int(1)));
        assert_eq!(inner.lookup("i"), Lookup::NotFound);
    }
}
