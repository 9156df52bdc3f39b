//! Port compatibility descriptors
//!
//! A [`Compatible`] pairs a port's declared type with connection
//! constraints. Two ports may be wired when their base types accept each
//! other and every constraint on both sides passes.

use std::fmt;

use crate::types::{DataKind, NodeId, PayloadType, PortDirection, PortType};

/// The view of one port a constraint is evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct PortContext<'a> {
    pub node: NodeId,
    pub direction: PortDirection,
    pub index: usize,
    pub compatible: &'a Compatible,
    /// Number of edges currently attached to the port
    pub edge_count: usize,
}

/// Predicate signature for custom constraints: `(this_port, other_port)`.
pub type ConstraintFn = fn(&PortContext<'_>, &PortContext<'_>) -> bool;

/// A connection constraint evaluated on the port that declares it.
#[derive(Clone, Copy)]
pub enum Constraint {
    /// The port must currently carry fewer than `n` edges
    MaximumUses(usize),
    /// Named custom predicate
    Custom { name: &'static str, check: ConstraintFn },
}

impl Constraint {
    /// Evaluate against `(this, other)`
    pub fn check(&self, this: &PortContext<'_>, other: &PortContext<'_>) -> bool {
        match self {
            Constraint::MaximumUses(n) => this.edge_count < *n,
            Constraint::Custom { check, .. } => check(this, other),
        }
    }

    pub fn name(&self) -> String {
        match self {
            Constraint::MaximumUses(n) => format!("MaximumUses({})", n),
            Constraint::Custom { name, .. } => (*name).to_string(),
        }
    }
}

impl fmt::Debug for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Outcome of matching two ports
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    Accepted,
    /// Base types cannot be joined
    TypeMismatch,
    /// A constraint on the node `node` failed
    ConstraintFailed { node: NodeId, constraint: String },
}

impl MatchOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, MatchOutcome::Accepted)
    }
}

/// Payload type plus constraints for one port
#[derive(Debug, Clone)]
pub struct Compatible {
    pub port_type: PortType,
    pub constraints: Vec<Constraint>,
}

impl Compatible {
    pub fn new(port_type: PortType) -> Self {
        Self {
            port_type,
            constraints: Vec::new(),
        }
    }

    pub fn kind(kind: DataKind) -> Self {
        Self::new(PortType::kind(kind))
    }

    /// Add a constraint
    pub fn with(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Shorthand for `with(Constraint::MaximumUses(n))`
    pub fn maximum_uses(self, n: usize) -> Self {
        self.with(Constraint::MaximumUses(n))
    }

    /// Ports carrying features mark pipeline sinks whose Results are kept
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.port_type.unwrap_stream(),
            PayloadType::Kind(DataKind::Feature) | PayloadType::Kind(DataKind::FeatureCollection)
        )
    }

    /// Decide whether ports `a` and `b` may be wired.
    ///
    /// Constraints declared on `a` are evaluated against `(a, b)`, then
    /// constraints on `b` against `(b, a)`.
    pub fn matches(a: &PortContext<'_>, b: &PortContext<'_>) -> MatchOutcome {
        let base_a = a.compatible.port_type.unwrap_stream();
        let base_b = b.compatible.port_type.unwrap_stream();
        if !base_a.accepts(&base_b) {
            return MatchOutcome::TypeMismatch;
        }

        for (this, other) in [(a, b), (b, a)] {
            for constraint in &this.compatible.constraints {
                if !constraint.check(this, other) {
                    return MatchOutcome::ConstraintFailed {
                        node: this.node,
                        constraint: constraint.name(),
                    };
                }
            }
        }

        MatchOutcome::Accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Capability;

    fn ctx(node: u32, direction: PortDirection, compatible: &Compatible, edges: usize) -> PortContext<'_> {
        PortContext {
            node: NodeId(node),
            direction,
            index: 0,
            compatible,
            edge_count: edges,
        }
    }

    #[test]
    fn test_exact_kind_match() {
        let out = Compatible::kind(DataKind::Image);
        let input = Compatible::kind(DataKind::Image);
        let other = Compatible::kind(DataKind::Scan);

        let a = ctx(0, PortDirection::Output, &out, 0);
        assert!(Compatible::matches(&a, &ctx(1, PortDirection::Input, &input, 0)).is_accepted());
        assert_eq!(
            Compatible::matches(&a, &ctx(1, PortDirection::Input, &other, 0)),
            MatchOutcome::TypeMismatch
        );
    }

    #[test]
    fn test_stream_wrapper_is_unwrapped() {
        let out = Compatible::new(PortType::kind(DataKind::Scan).stream());
        let input = Compatible::new(PortType::capability(Capability::Raster));
        let a = ctx(0, PortDirection::Output, &out, 0);
        let b = ctx(1, PortDirection::Input, &input, 0);
        assert!(Compatible::matches(&a, &b).is_accepted());
        assert!(Compatible::matches(&b, &a).is_accepted());
    }

    #[test]
    fn test_maximum_uses() {
        let out = Compatible::kind(DataKind::Number);
        let input = Compatible::kind(DataKind::Number).maximum_uses(1);
        let a = ctx(0, PortDirection::Output, &out, 0);

        assert!(Compatible::matches(&a, &ctx(1, PortDirection::Input, &input, 0)).is_accepted());
        let outcome = Compatible::matches(&a, &ctx(1, PortDirection::Input, &input, 1));
        assert_eq!(
            outcome,
            MatchOutcome::ConstraintFailed {
                node: NodeId(1),
                constraint: "MaximumUses(1)".to_string()
            }
        );
    }

    #[test]
    fn test_constraints_evaluated_per_side() {
        // Type equality is symmetric, but each side's constraint sees its own edge count.
        let limited = Compatible::kind(DataKind::Number).maximum_uses(2);
        let free = Compatible::kind(DataKind::Number);

        let saturated = ctx(0, PortDirection::Output, &limited, 2);
        let fresh = ctx(1, PortDirection::Input, &free, 0);
        assert!(!Compatible::matches(&saturated, &fresh).is_accepted());
        assert!(!Compatible::matches(&fresh, &saturated).is_accepted());

        let open = ctx(0, PortDirection::Output, &limited, 1);
        assert!(Compatible::matches(&open, &fresh).is_accepted());
    }

    #[test]
    fn test_custom_constraint_receives_other_port() {
        fn other_is_input(_this: &PortContext<'_>, other: &PortContext<'_>) -> bool {
            other.direction == PortDirection::Input
        }
        let guarded = Compatible::kind(DataKind::Text).with(Constraint::Custom {
            name: "other-is-input",
            check: other_is_input,
        });
        let plain = Compatible::kind(DataKind::Text);

        let a = ctx(0, PortDirection::Output, &guarded, 0);
        assert!(Compatible::matches(&a, &ctx(1, PortDirection::Input, &plain, 0)).is_accepted());
        assert!(!Compatible::matches(&a, &ctx(1, PortDirection::Output, &plain, 0)).is_accepted());
    }

    #[test]
    fn test_is_terminal() {
        assert!(Compatible::kind(DataKind::Feature).is_terminal());
        assert!(Compatible::new(PortType::kind(DataKind::FeatureCollection).stream()).is_terminal());
        assert!(!Compatible::kind(DataKind::Image).is_terminal());
        assert!(!Compatible::new(PortType::capability(Capability::Measurement)).is_terminal());
    }
}
