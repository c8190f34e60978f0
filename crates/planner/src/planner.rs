use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use toolmesh_catalog::ToolCatalog;
use toolmesh_core_types::{ExecutionMode, MeshError, ToolCall, ToolSpec};

use crate::model::{ExecutionPhase, ExecutionPlan, PhaseMode};

/// Turns an unordered batch of tool calls into ordered execution phases.
///
/// Dependencies are resolved by topological order; conflicts by keeping
/// the conflicting calls out of the same parallel phase. Planning never
/// mutates anything: every error here is safe to retry after fixing the
/// input.
pub struct ExecutionPlanner {
    catalog: Arc<ToolCatalog>,
}

impl ExecutionPlanner {
    pub fn new(catalog: Arc<ToolCatalog>) -> Self {
        Self { catalog }
    }

    pub fn plan(&self, calls: Vec<ToolCall>) -> Result<ExecutionPlan, MeshError> {
        if calls.is_empty() {
            return Ok(ExecutionPlan::default());
        }

        let mut specs: HashMap<String, Arc<ToolSpec>> = HashMap::new();
        for call in &calls {
            let spec = self
                .catalog
                .get(&call.tool)
                .ok_or_else(|| MeshError::UnknownTool(call.tool.clone()))?;
            self.catalog.validate_args(&call.tool, &call.args)?;
            specs.insert(call.tool.clone(), spec);
        }

        check_cycles(&specs)?;
        Ok(carve_phases(calls, &specs))
    }
}

/// DFS three-color cycle check over the dependency edges restricted to
/// the submitted tool set. Dependencies on tools outside the batch are
/// assumed satisfied and carry no edge.
fn check_cycles(specs: &HashMap<String, Arc<ToolSpec>>) -> Result<(), MeshError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        InStack,
        Done,
    }

    fn visit(
        tool: &str,
        specs: &HashMap<String, Arc<ToolSpec>>,
        marks: &mut HashMap<String, Mark>,
    ) -> Result<(), MeshError> {
        match marks.get(tool) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::InStack) => return Err(MeshError::CyclicDependency(tool.to_string())),
            None => {}
        }
        marks.insert(tool.to_string(), Mark::InStack);
        if let Some(spec) = specs.get(tool) {
            for dep in &spec.dependencies {
                if specs.contains_key(dep) {
                    visit(dep, specs, marks)?;
                }
            }
        }
        marks.insert(tool.to_string(), Mark::Done);
        Ok(())
    }

    let mut marks = HashMap::new();
    let mut names: Vec<&String> = specs.keys().collect();
    names.sort();
    for name in names {
        visit(name, specs, &mut marks)?;
    }
    Ok(())
}

fn carve_phases(calls: Vec<ToolCall>, specs: &HashMap<String, Arc<ToolSpec>>) -> ExecutionPlan {
    let input_tools: HashSet<String> = specs.keys().cloned().collect();
    let mut remaining = calls;
    let mut satisfied: HashSet<String> = HashSet::new();
    let mut tool_phase: HashMap<String, usize> = HashMap::new();
    let mut phases: Vec<ExecutionPhase> = Vec::new();
    let mut total_duration = 0u64;

    while !remaining.is_empty() {
        let ready: Vec<usize> = remaining
            .iter()
            .enumerate()
            .filter(|(_, call)| {
                specs[&call.tool]
                    .dependencies
                    .iter()
                    .filter(|dep| input_tools.contains(*dep) && **dep != call.tool)
                    .all(|dep| satisfied.contains(dep))
            })
            .map(|(index, _)| index)
            .collect();

        // The cycle check already ran, so a stall cannot happen; admit the
        // front of the queue rather than loop forever if it somehow does.
        let admitted: Vec<usize> = if ready.is_empty() {
            vec![0]
        } else {
            pick_admissions(&ready, &remaining, specs)
        };

        let id = phases.len();
        let calls_in_phase: Vec<&ToolCall> = admitted.iter().map(|&i| &remaining[i]).collect();
        let (mode, requires_confirmation) = phase_attributes(&calls_in_phase, specs);

        let mut upstream: Vec<usize> = calls_in_phase
            .iter()
            .flat_map(|call| specs[&call.tool].dependencies.iter())
            .filter_map(|dep| tool_phase.get(dep).copied())
            .collect();
        upstream.sort_unstable();
        upstream.dedup();

        let estimates = calls_in_phase
            .iter()
            .map(|call| specs[&call.tool].estimated_duration_ms);
        let estimated_duration_ms = match mode {
            PhaseMode::Parallel => estimates.max().unwrap_or(0),
            PhaseMode::Serial => estimates.sum(),
        };
        total_duration += estimated_duration_ms;

        for call in &calls_in_phase {
            satisfied.insert(call.tool.clone());
            tool_phase.insert(call.tool.clone(), id);
        }
        debug!(
            target: "planner",
            phase = id,
            calls = calls_in_phase.len(),
            ?mode,
            requires_confirmation,
            "phase carved"
        );

        let mut owned = Vec::with_capacity(admitted.len());
        for &index in admitted.iter().rev() {
            owned.push(remaining.remove(index));
        }
        owned.reverse();
        phases.push(ExecutionPhase {
            id,
            calls: owned,
            mode,
            requires_confirmation,
            upstream,
            estimated_duration_ms,
        });
    }

    ExecutionPlan {
        phases,
        estimated_total_duration_ms: total_duration,
    }
}

/// Choose which ready calls form the next phase. Interactive and serial
/// tools always get a phase to themselves; parallel tools are admitted
/// greedily by priority unless they conflict with an earlier admission.
fn pick_admissions(
    ready: &[usize],
    remaining: &[ToolCall],
    specs: &HashMap<String, Arc<ToolSpec>>,
) -> Vec<usize> {
    let by_priority = |indices: Vec<usize>| -> Vec<usize> {
        let mut sorted = indices;
        sorted.sort_by(|&a, &b| {
            let (sa, sb) = (&specs[&remaining[a].tool], &specs[&remaining[b].tool]);
            sb.priority
                .cmp(&sa.priority)
                .then_with(|| sa.name.cmp(&sb.name))
                .then_with(|| a.cmp(&b))
        });
        sorted
    };

    for mode in [ExecutionMode::Interactive, ExecutionMode::Serial] {
        let singletons: Vec<usize> = ready
            .iter()
            .copied()
            .filter(|&i| specs[&remaining[i].tool].execution_mode == mode)
            .collect();
        if !singletons.is_empty() {
            return vec![by_priority(singletons)[0]];
        }
    }

    let mut admitted: Vec<usize> = Vec::new();
    for index in by_priority(ready.to_vec()) {
        let tool = &remaining[index].tool;
        let clashes = admitted.iter().any(|&other| {
            let admitted_tool = &remaining[other].tool;
            conflicts(specs, tool, admitted_tool)
        });
        if !clashes {
            admitted.push(index);
        }
    }
    admitted.sort_unstable();
    admitted
}

fn conflicts(specs: &HashMap<String, Arc<ToolSpec>>, a: &str, b: &str) -> bool {
    let declares =
        |tool: &str, other: &str| specs[tool].conflicts_with.iter().any(|c| c == other);
    declares(a, b) || declares(b, a)
}

fn phase_attributes(
    calls: &[&ToolCall],
    specs: &HashMap<String, Arc<ToolSpec>>,
) -> (PhaseMode, bool) {
    if calls.len() == 1 {
        let spec = &specs[&calls[0].tool];
        return match spec.execution_mode {
            ExecutionMode::Interactive => (PhaseMode::Serial, true),
            ExecutionMode::Serial => (PhaseMode::Serial, spec.requires_confirmation),
            ExecutionMode::Parallel => (PhaseMode::Parallel, spec.requires_confirmation),
        };
    }
    let requires_confirmation = calls
        .iter()
        .any(|call| specs[&call.tool].requires_confirmation);
    (PhaseMode::Parallel, requires_confirmation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;
    use toolmesh_core_types::CallId;

    fn planner(specs: Vec<ToolSpec>) -> ExecutionPlanner {
        let catalog = ToolCatalog::new();
        for spec in specs {
            catalog.register(spec).unwrap();
        }
        ExecutionPlanner::new(Arc::new(catalog))
    }

    fn tools_of(phase: &ExecutionPhase) -> Vec<&str> {
        phase.calls.iter().map(|c| c.tool.as_str()).collect()
    }

    #[test]
    fn dependencies_land_in_strictly_earlier_phases() {
        let planner = planner(vec![
            ToolSpec::new("fetchPage", ExecutionMode::Parallel),
            ToolSpec::new("extract", ExecutionMode::Parallel).with_dependencies(["fetchPage"]),
            ToolSpec::new("analyze", ExecutionMode::Parallel).with_dependencies(["extract"]),
        ]);

        let plan = planner
            .plan(vec![
                ToolCall::new("analyze"),
                ToolCall::new("fetchPage"),
                ToolCall::new("extract"),
            ])
            .unwrap();

        assert_eq!(plan.phases.len(), 3);
        assert_eq!(tools_of(&plan.phases[0]), vec!["fetchPage"]);
        assert_eq!(tools_of(&plan.phases[1]), vec!["extract"]);
        assert_eq!(tools_of(&plan.phases[2]), vec!["analyze"]);
        assert_eq!(plan.phases[1].upstream, vec![0]);
        assert_eq!(plan.phases[2].upstream, vec![1]);
    }

    #[test]
    fn cycle_is_a_planning_error() {
        let planner = planner(vec![
            ToolSpec::new("a", ExecutionMode::Parallel).with_dependencies(["b"]),
            ToolSpec::new("b", ExecutionMode::Parallel).with_dependencies(["a"]),
        ]);

        let err = planner
            .plan(vec![ToolCall::new("a"), ToolCall::new("b")])
            .unwrap_err();
        assert!(matches!(err, MeshError::CyclicDependency(_)));
    }

    #[test]
    fn dependencies_outside_the_batch_are_ignored() {
        let planner = planner(vec![
            ToolSpec::new("extract", ExecutionMode::Parallel).with_dependencies(["fetchPage"])
        ]);

        let plan = planner.plan(vec![ToolCall::new("extract")]).unwrap();
        assert_eq!(plan.phases.len(), 1);
        assert!(plan.phases[0].upstream.is_empty());
    }

    #[test]
    fn conflicting_tools_never_share_a_parallel_phase() {
        let planner = planner(vec![
            ToolSpec::new("screenshot", ExecutionMode::Parallel)
                .with_priority(8)
                .with_conflicts(["analyze"]),
            ToolSpec::new("analyze", ExecutionMode::Parallel).with_priority(5),
            ToolSpec::new("readDom", ExecutionMode::Parallel).with_priority(3),
        ]);

        let plan = planner
            .plan(vec![
                ToolCall::new("analyze"),
                ToolCall::new("screenshot"),
                ToolCall::new("readDom"),
            ])
            .unwrap();

        // Higher priority wins the first phase; the conflicting tool waits.
        assert_eq!(plan.phases.len(), 2);
        let first: HashSet<&str> = tools_of(&plan.phases[0]).into_iter().collect();
        assert!(first.contains("screenshot"));
        assert!(first.contains("readDom"));
        assert_eq!(tools_of(&plan.phases[1]), vec!["analyze"]);
    }

    #[test]
    fn interactive_tools_get_a_confirmed_singleton_phase() {
        let planner = planner(vec![
            ToolSpec::new("submitForm", ExecutionMode::Interactive),
            ToolSpec::new("readDom", ExecutionMode::Parallel),
        ]);

        let plan = planner
            .plan(vec![ToolCall::new("readDom"), ToolCall::new("submitForm")])
            .unwrap();

        let interactive = plan
            .phases
            .iter()
            .find(|p| tools_of(p) == vec!["submitForm"])
            .unwrap();
        assert_eq!(interactive.mode, PhaseMode::Serial);
        assert!(interactive.requires_confirmation);
    }

    #[test]
    fn serial_phase_copies_the_tools_confirmation_flag() {
        let planner = planner(vec![
            ToolSpec::new("navigate", ExecutionMode::Serial),
            ToolSpec::new("purgeCache", ExecutionMode::Serial).with_confirmation(),
        ]);

        let plan = planner
            .plan(vec![ToolCall::new("navigate"), ToolCall::new("purgeCache")])
            .unwrap();

        for phase in &plan.phases {
            assert_eq!(phase.mode, PhaseMode::Serial);
            assert_eq!(phase.calls.len(), 1);
            let expects = phase.calls[0].tool == "purgeCache";
            assert_eq!(phase.requires_confirmation, expects);
        }
    }

    #[test]
    fn unknown_tool_and_bad_args_abort_planning() {
        let planner = planner(vec![ToolSpec::new("navigate", ExecutionMode::Serial)
            .with_schema(json!({
                "type": "object",
                "properties": { "url": { "type": "string" } },
                "required": ["url"]
            }))]);

        let unknown = planner.plan(vec![ToolCall::new("ghost")]).unwrap_err();
        assert!(matches!(unknown, MeshError::UnknownTool(name) if name == "ghost"));

        let bad_args = planner
            .plan(vec![ToolCall::new("navigate").with_args(json!({ "url": 42 }))])
            .unwrap_err();
        assert!(matches!(bad_args, MeshError::InvalidArguments { .. }));
    }

    #[test]
    fn every_call_appears_exactly_once() {
        let planner = planner(vec![
            ToolSpec::new("fetchPage", ExecutionMode::Parallel),
            ToolSpec::new("extract", ExecutionMode::Parallel).with_dependencies(["fetchPage"]),
            ToolSpec::new("navigate", ExecutionMode::Serial),
            ToolSpec::new("submitForm", ExecutionMode::Interactive),
        ]);

        let calls = vec![
            ToolCall::new("fetchPage"),
            ToolCall::new("extract"),
            ToolCall::new("navigate"),
            ToolCall::new("submitForm"),
            ToolCall::new("fetchPage"),
        ];
        let submitted: HashSet<CallId> = calls.iter().map(|c| c.call_id.clone()).collect();

        let plan = planner.plan(calls).unwrap();
        assert_eq!(plan.call_count(), 5);
        let placed: HashSet<CallId> = plan.call_ids().cloned().collect();
        assert_eq!(placed, submitted);
    }

    #[test]
    fn duration_estimate_is_max_for_parallel_and_sum_for_serial() {
        let planner = planner(vec![
            ToolSpec::new("snapA", ExecutionMode::Parallel).with_duration_ms(300),
            ToolSpec::new("snapB", ExecutionMode::Parallel).with_duration_ms(500),
            ToolSpec::new("navigate", ExecutionMode::Serial).with_duration_ms(200),
        ]);

        let plan = planner
            .plan(vec![
                ToolCall::new("snapA"),
                ToolCall::new("snapB"),
                ToolCall::new("navigate"),
            ])
            .unwrap();

        // One serial singleton plus one parallel pair in either order.
        assert_eq!(plan.estimated_total_duration_ms, 500 + 200);
    }

    #[test]
    fn empty_submission_yields_empty_plan() {
        let planner = planner(vec![]);
        let plan = planner.plan(Vec::new()).unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.estimated_total_duration_ms, 0);
    }
}
