use crate::coords::Extent;

use super::composite::Stage;
use super::Effect;

/// Branches taken from the root to reach a node; empty for the root.
pub type NodePath = Vec<Stage>;

/// What a pass samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassInput {
    /// The client's content, drawn with the leaf's program bound.
    Content,
    /// The intermediate target of the composite at this path, drawn as a
    /// full-screen quad.
    Target(NodePath),
}

/// Where a pass renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutput {
    Destination,
    Target(NodePath),
}

/// Intermediate target a composite needs for the frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRequest {
    pub node: NodePath,
    pub extent: Extent,
}

/// One leaf draw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassStep {
    /// Path of the leaf effect.
    pub node: NodePath,
    pub input: PassInput,
    pub output: PassOutput,
    pub output_extent: Extent,
}

impl PassStep {
    pub fn draws_content(&self) -> bool {
        self.input == PassInput::Content
    }

    pub fn renders_to_destination(&self) -> bool {
        self.output == PassOutput::Destination
    }
}

/// Leaf passes of an effect tree in execution order (depth-first, leaves
/// first), plus the intermediate targets they read and write.
///
/// Each composite adds one target and turns its `second` subtree's input
/// into a full-screen blit of that target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FramePlan {
    pub steps: Vec<PassStep>,
    pub targets: Vec<TargetRequest>,
}

impl FramePlan {
    pub fn build(root: &Effect, destination: Extent) -> Self {
        let mut plan = FramePlan::default();
        let mut path = NodePath::new();
        plan.visit(
            root,
            &mut path,
            PassInput::Content,
            PassOutput::Destination,
            destination,
            destination,
        );
        plan
    }

    fn visit(
        &mut self,
        effect: &Effect,
        path: &mut NodePath,
        input: PassInput,
        output: PassOutput,
        output_extent: Extent,
        outer: Extent,
    ) {
        let Some(composite) = effect.as_composite() else {
            self.steps.push(PassStep {
                node: path.clone(),
                input,
                output,
                output_extent,
            });
            return;
        };

        let node = path.clone();
        let internal = composite.internal_extent(outer);

        path.push(Stage::First);
        self.visit(
            composite.first(),
            path,
            input,
            PassOutput::Target(node.clone()),
            internal,
            internal,
        );
        path.pop();

        path.push(Stage::Second);
        self.visit(
            composite.second(),
            path,
            PassInput::Target(node.clone()),
            output,
            output_extent,
            internal,
        );
        path.pop();

        self.targets.push(TargetRequest { node, extent: internal });
    }

    pub fn target_extent(&self, node: &[Stage]) -> Option<Extent> {
        self.targets
            .iter()
            .find(|t| t.node == node)
            .map(|t| t.extent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::{BlurEffect, CompositeEffect, builtin};
    use Stage::{First, Second};

    const DEST: Extent = Extent::new(256, 256);

    fn leaf() -> Effect {
        builtin::passthrough().into()
    }

    fn composite(first: impl Into<Effect>, second: impl Into<Effect>) -> CompositeEffect {
        CompositeEffect::new(first, second)
    }

    #[test]
    fn single_effect_draws_content_to_destination() {
        let plan = FramePlan::build(&leaf(), DEST);
        assert!(plan.targets.is_empty());
        assert_eq!(
            plan.steps,
            vec![PassStep {
                node: vec![],
                input: PassInput::Content,
                output: PassOutput::Destination,
                output_extent: DEST,
            }]
        );
    }

    #[test]
    fn composite_chains_through_one_target() {
        let plan = FramePlan::build(&composite(leaf(), leaf()).into(), DEST);
        assert_eq!(plan.targets, vec![TargetRequest { node: vec![], extent: DEST }]);
        assert_eq!(plan.steps.len(), 2);

        assert_eq!(plan.steps[0].node, vec![First]);
        assert!(plan.steps[0].draws_content());
        assert_eq!(plan.steps[0].output, PassOutput::Target(vec![]));

        assert_eq!(plan.steps[1].node, vec![Second]);
        assert_eq!(plan.steps[1].input, PassInput::Target(vec![]));
        assert!(plan.steps[1].renders_to_destination());
    }

    #[test]
    fn nested_composites_run_leaves_first() {
        // ((a, b), c)
        let tree: Effect = composite(composite(leaf(), leaf()), leaf()).into();
        let plan = FramePlan::build(&tree, DEST);

        let order: Vec<_> = plan.steps.iter().map(|s| s.node.clone()).collect();
        assert_eq!(order, vec![vec![First, First], vec![First, Second], vec![Second]]);

        assert_eq!(plan.steps[0].output, PassOutput::Target(vec![First]));
        assert_eq!(plan.steps[1].input, PassInput::Target(vec![First]));
        assert_eq!(plan.steps[1].output, PassOutput::Target(vec![]));
        assert_eq!(plan.steps[2].input, PassInput::Target(vec![]));
        assert_eq!(plan.targets.len(), 2);
    }

    #[test]
    fn each_internal_node_adds_a_target_and_a_blit() {
        // (a, (b, (c, d)))
        let tree: Effect = composite(leaf(), composite(leaf(), composite(leaf(), leaf()))).into();
        let plan = FramePlan::build(&tree, DEST);
        assert_eq!(plan.targets.len(), 3);
        assert_eq!(plan.steps.len(), 4);
        assert_eq!(plan.steps.iter().filter(|s| s.draws_content()).count(), 1);
        assert_eq!(plan.steps.iter().filter(|s| s.renders_to_destination()).count(), 1);
    }

    #[test]
    fn downsampled_composite_sizes_nested_targets() {
        let mut outer = composite(builtin::grayscale(), BlurEffect::new(2.0).unwrap());
        outer.set_downsample_level(1);
        let plan = FramePlan::build(&outer.into(), DEST);

        assert_eq!(plan.target_extent(&[]), Some(Extent::new(128, 128)));
        // The blur's own target follows the enclosing composite's target.
        assert_eq!(plan.target_extent(&[Second]), Some(Extent::new(128, 128)));

        let last = plan.steps.last().unwrap();
        assert_eq!(last.node, vec![Second, Second]);
        assert_eq!(last.output_extent, DEST);
    }
}
