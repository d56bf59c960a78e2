use flowtree_parser::ast::Component;

/// Visitor pattern for traversing component trees immutably
///
/// The default implementation walks the entire tree depth-first and
/// pre-order. Override `visit_component` and call `walk_component` to keep
/// descending.
pub trait Visitor: Sized {
    fn visit_component(&mut self, component: &Component) {
        walk_component(self, component);
    }

    fn visit_option(&mut self, _owner: &Component, _key: &str, _value: Option<&str>) {
        // Leaf, nothing to walk
    }
}

pub fn walk_component<V: Visitor>(visitor: &mut V, component: &Component) {
    for (key, value) in component.options.iter() {
        visitor.visit_option(component, key, value);
    }
    for child in &component.children {
        visitor.visit_component(child);
    }
}

/// Walks a list of sibling trees
pub fn walk_all<V: Visitor>(visitor: &mut V, components: &[Component]) {
    for component in components {
        visitor.visit_component(component);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TypeCollector(Vec<String>);

    impl Visitor for TypeCollector {
        fn visit_component(&mut self, component: &Component) {
            self.0.push(component.type_id.clone());
            walk_component(self, component);
        }
    }

    struct OptionCounter(usize);

    impl Visitor for OptionCounter {
        fn visit_option(&mut self, _owner: &Component, _key: &str, _value: Option<&str>) {
            self.0 += 1;
        }
    }

    #[test]
    fn test_walk_is_preorder() {
        let tree = Component::new("Flow", "Flow")
            .with_child(Component::new("Sequence", "s").with_child(Component::new("Display", "d")))
            .with_child(Component::new("Null", "n"));

        let mut collector = TypeCollector(Vec::new());
        collector.visit_component(&tree);
        assert_eq!(collector.0, vec!["Flow", "Sequence", "Display", "Null"]);
    }

    #[test]
    fn test_options_are_visited() {
        let tree = Component::new("Flow", "Flow")
            .with_option("a", "1")
            .with_child(Component::new("Display", "d").with_option("b", "2"));

        let mut counter = OptionCounter(0);
        walk_all(&mut counter, &[tree]);
        assert_eq!(counter.0, 2);
    }
}
