use super::*;
use crate::lineage::builder::tests::session;
use crate::selection::Selection;
use crate::training::tests::parameters_for;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Mutex;

struct FakeService {
    groups: Mutex<Vec<ModelGroup>>,
    sessions: Mutex<HashMap<ModelGroupId, Vec<SessionRecord>>>,
    parameters: HashMap<String, ParameterRecord>,
    retrained: Mutex<Vec<TrainingForm>>,
}

impl FakeService {
    fn fixture() -> Self {
        let in_group = |id: &str, parent: Option<&str>, group: ModelGroupId| {
            let mut record = session(id, parent);
            record.model_group_id = group;
            record
        };
        let sessions = HashMap::from([
            (
                1,
                vec![
                    in_group("A", None, 1),
                    in_group("B", Some("A"), 1),
                    in_group("C", Some("A"), 1),
                ],
            ),
            (2, vec![in_group("X", None, 2)]),
            (4, vec![in_group("P", None, 4), in_group("Q", None, 4)]),
        ]);
        let parameters = ["A", "B", "C"]
            .into_iter()
            .map(|id| (id.to_string(), parameters_for(id)))
            .collect();

        let groups = vec![ModelGroup {
            id: 1,
            name: "ko-chat".into(),
            base_model_id: Some(1),
            base_model_name: "base".into(),
            description: String::new(),
        }];

        Self {
            groups: Mutex::new(groups),
            sessions: Mutex::new(sessions),
            parameters,
            retrained: Mutex::new(Vec::new()),
        }
    }
}

impl HistoryService for FakeService {
    fn fetch_model_groups(&self) -> Result<Vec<ModelGroup>, ApiError> {
        Ok(self.groups.lock().unwrap().clone())
    }

    fn fetch_sessions(&self, model_group_id: ModelGroupId) -> Result<Vec<SessionRecord>, ApiError> {
        let sessions = self.sessions.lock().unwrap();
        Ok(sessions.get(&model_group_id).cloned().unwrap_or_default())
    }

    fn fetch_parameters(&self, session_id: &str) -> Result<ParameterRecord, ApiError> {
        self.parameters
            .get(session_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("parameters for session {session_id}")))
    }

    fn retrain(&self, form: &TrainingForm) -> Result<SessionRecord, ApiError> {
        self.retrained.lock().unwrap().push(form.clone());
        let mut record = session("N", form.parent_session_no.as_deref());
        record.model_group_id = form.fm_no.unwrap_or_default();
        self.sessions
            .lock()
            .unwrap()
            .entry(record.model_group_id)
            .or_default()
            .push(record.clone());
        Ok(record)
    }
}

/// Holds jobs until the test decides when, and in which order, they finish.
#[derive(Default)]
struct ManualExecutor {
    jobs: RefCell<Vec<Job>>,
}

impl Executor for ManualExecutor {
    fn execute(&self, job: Job) {
        self.jobs.borrow_mut().push(job);
    }
}

impl ManualExecutor {
    fn pending(&self) -> usize {
        self.jobs.borrow().len()
    }

    fn run(&self, index: usize) {
        let job = self.jobs.borrow_mut().remove(index);
        job();
    }

    fn run_all(&self) {
        while self.pending() > 0 {
            self.run(0);
        }
    }
}

fn console() -> (Console, Rc<ManualExecutor>, Arc<FakeService>) {
    let service = Arc::new(FakeService::fixture());
    let executor = Rc::new(ManualExecutor::default());
    let console = Console::new(service.clone(), executor.clone(), LineageConfig::default());
    (console, executor, service)
}

fn settle(console: &mut Console, executor: &ManualExecutor) {
    executor.run_all();
    console.poll();
}

fn ready(console: &mut Console) -> Projection {
    match console.graph() {
        GraphView::Ready(projection) => projection.clone(),
        other => panic!("expected a graph, got {other:?}"),
    }
}

#[test]
fn loads_and_projects_selected_group() {
    let (mut console, executor, _) = console();
    assert_eq!(console.graph(), &GraphView::NoGroup);

    console.select_group(1);
    assert_eq!(console.graph(), &GraphView::Loading);
    assert!(console.has_pending_work());

    settle(&mut console, &executor);
    assert_eq!(console.graph(), &GraphView::WaitingForViewport);

    console.on_viewport(Vec2::new(800.0, 600.0));
    let projection = ready(&mut console);
    assert_eq!(projection.nodes.len(), 3);
    assert_eq!(projection.edges.len(), 2);
    assert!(!console.has_pending_work());
}

#[test]
fn empty_and_invalid_groups_are_distinct() {
    let (mut console, executor, _) = console();
    console.on_viewport(Vec2::new(800.0, 600.0));

    console.select_group(3);
    settle(&mut console, &executor);
    assert_eq!(console.graph(), &GraphView::Empty);

    console.select_group(4);
    settle(&mut console, &executor);
    assert!(matches!(
        console.graph(),
        GraphView::Invalid(LineageError::MultipleRoots(_))
    ));
}

#[test]
fn late_detail_for_earlier_click_is_ignored() {
    let (mut console, executor, _) = console();
    console.on_viewport(Vec2::new(800.0, 600.0));
    console.select_group(1);
    settle(&mut console, &executor);

    console.on_node_activated("B");
    console.on_node_activated("C");
    assert_eq!(executor.pending(), 2);

    // C's fetch finishes first, B's straggles in afterwards
    executor.run(1);
    console.poll();
    executor.run(0);
    console.poll();

    let snapshot = console.selection();
    assert_eq!(snapshot.selected_session_id.as_deref(), Some("C"));
    assert_eq!(
        snapshot.current_parameters.map(|p| p.session_no).as_deref(),
        Some("C")
    );
    assert_eq!(ready(&mut console).selected().map(|n| n.id.as_str()), Some("C"));
}

#[test]
fn earlier_click_resolving_first_leaves_newer_selection_pending() {
    let (mut console, executor, _) = console();
    console.select_group(1);
    settle(&mut console, &executor);

    console.on_node_activated("B");
    console.on_node_activated("C");
    executor.run(0);
    console.poll();

    let snapshot = console.selection();
    assert_eq!(snapshot.selected_session_id.as_deref(), Some("C"));
    assert!(snapshot.is_loading);
    assert!(snapshot.current_parameters.is_none());
}

#[test]
fn background_click_clears_selection_flags() {
    let (mut console, executor, _) = console();
    console.on_viewport(Vec2::new(800.0, 600.0));
    console.select_group(1);
    settle(&mut console, &executor);

    console.on_node_activated("B");
    assert_eq!(ready(&mut console).selected().map(|n| n.id.as_str()), Some("B"));

    console.on_background_activated();
    settle(&mut console, &executor);
    assert!(ready(&mut console).nodes.iter().all(|n| !n.selected));
    assert_eq!(console.selection(), SelectionSnapshot::default());
}

#[test]
fn selection_survives_resize() {
    let (mut console, executor, _) = console();
    console.on_viewport(Vec2::new(800.0, 600.0));
    console.select_group(1);
    settle(&mut console, &executor);
    console.on_node_activated("C");

    console.on_viewport(Vec2::new(1200.0, 900.0));
    let projection = ready(&mut console);
    assert_eq!(projection.selected().map(|n| n.id.as_str()), Some("C"));
    assert_eq!(projection.node("B").unwrap().position.y, 900.0 * 0.2);
}

#[test]
fn group_change_resets_selection_and_drops_stale_loads() {
    let (mut console, executor, _) = console();
    console.on_viewport(Vec2::new(800.0, 600.0));
    console.select_group(1);
    settle(&mut console, &executor);
    console.on_node_activated("B");

    console.select_group(1);
    console.select_group(2);
    settle(&mut console, &executor);

    assert_eq!(console.active_group(), Some(2));
    assert_eq!(console.selection(), SelectionSnapshot::default());
    assert_eq!(console.selection.state(), &Selection::Idle);
    let projection = ready(&mut console);
    let ids: Vec<&str> = projection.nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids, ["X"]);
}

#[test]
fn resize_and_data_arrival_order_do_not_matter() {
    let (mut first, executor_a, _) = console();
    first.select_group(1);
    first.on_viewport(Vec2::new(640.0, 480.0));
    settle(&mut first, &executor_a);

    let (mut second, executor_b, _) = console();
    second.select_group(1);
    settle(&mut second, &executor_b);
    second.on_viewport(Vec2::new(300.0, 200.0));
    let _ = second.graph();
    second.on_viewport(Vec2::new(640.0, 480.0));

    assert_eq!(ready(&mut first), ready(&mut second));
}

#[test]
fn missing_parameters_surface_as_error_and_retry() {
    let (mut console, executor, _) = console();
    console.select_group(2);
    settle(&mut console, &executor);

    console.on_node_activated("X");
    settle(&mut console, &executor);
    let snapshot = console.selection();
    assert!(snapshot.is_error);
    assert_eq!(snapshot.selected_session_id.as_deref(), Some("X"));
    assert_eq!(
        snapshot.error.as_deref(),
        Some("parameters for session X not found")
    );

    console.retry_detail();
    assert!(console.selection().is_loading);
    settle(&mut console, &executor);
    assert!(console.selection().is_error);
}

#[test]
fn continue_training_posts_child_of_selection_and_reloads() {
    let (mut console, executor, service) = console();
    console.on_viewport(Vec2::new(800.0, 600.0));
    console.select_group(1);
    settle(&mut console, &executor);

    console.on_node_activated("B");
    settle(&mut console, &executor);
    console.continue_training("ko-chat-v3").unwrap();
    assert!(console.continuation().is_loading());

    settle(&mut console, &executor);
    assert_eq!(console.continuation().ready().map(|s| s.session_id.as_str()), Some("N"));
    {
        let forms = service.retrained.lock().unwrap();
        assert_eq!(forms.len(), 1);
        assert_eq!(forms[0].parent_session_no.as_deref(), Some("B"));
        assert_eq!(forms[0].ts_model_name, "ko-chat-v3");
    }

    // The reload issued after the retrain brings the new run into the graph
    settle(&mut console, &executor);
    let projection = ready(&mut console);
    assert_eq!(projection.nodes.len(), 4);
    assert!(projection
        .edges
        .iter()
        .any(|e| e.source_id == "B" && e.target_id == "N"));
    assert_eq!(projection.selected().map(|n| n.id.as_str()), Some("B"));
}

#[test]
fn continue_training_needs_selection_and_parameters() {
    let (mut console, executor, _) = console();
    console.select_group(1);
    settle(&mut console, &executor);

    assert_eq!(console.continue_training("v2"), Err(ContinueError::NothingSelected));

    console.on_node_activated("B");
    assert_eq!(
        console.continue_training("v2"),
        Err(ContinueError::ParametersNotLoaded)
    );

    settle(&mut console, &executor);
    assert_eq!(console.continue_training(" "), Err(ContinueError::MissingModelName));
}

#[test]
fn model_groups_load_in_background() {
    let (mut console, executor, _) = console();
    console.refresh_model_groups();
    assert!(console.model_groups().is_loading());

    settle(&mut console, &executor);
    let groups = console.model_groups().ready().unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].name, "ko-chat");
}

#[test]
fn older_model_group_refresh_does_not_overwrite_newer() {
    let (mut console, executor, service) = console();
    console.refresh_model_groups();
    console.refresh_model_groups();

    // The second refresh answers first with the current list
    executor.run(1);
    console.poll();
    assert_eq!(console.model_groups().ready().map(Vec::len), Some(1));

    // The first one straggles in after the service has changed
    service.groups.lock().unwrap().clear();
    executor.run(0);
    console.poll();
    assert_eq!(console.model_groups().ready().map(Vec::len), Some(1));
    assert!(!console.has_pending_work());
}

#[test]
fn continuation_result_after_moving_on_is_not_shown() {
    let (mut console, executor, service) = console();
    console.on_viewport(Vec2::new(800.0, 600.0));
    console.select_group(1);
    settle(&mut console, &executor);

    console.on_node_activated("B");
    settle(&mut console, &executor);
    console.continue_training("ko-chat-v3").unwrap();
    console.on_node_activated("C");

    settle(&mut console, &executor);
    assert_eq!(console.continuation(), &Remote::Idle);
    assert_eq!(service.retrained.lock().unwrap().len(), 1);

    // The run still lands in the graph, under B, with C still selected
    settle(&mut console, &executor);
    let projection = ready(&mut console);
    assert!(projection
        .edges
        .iter()
        .any(|e| e.source_id == "B" && e.target_id == "N"));
    assert_eq!(console.selection().selected_session_id.as_deref(), Some("C"));
}

#[test]
fn continuation_result_after_group_change_is_not_shown() {
    let (mut console, executor, _) = console();
    console.select_group(1);
    settle(&mut console, &executor);
    console.on_node_activated("A");
    settle(&mut console, &executor);

    console.continue_training("ko-chat-v2").unwrap();
    console.select_group(2);
    settle(&mut console, &executor);

    assert_eq!(console.continuation(), &Remote::Idle);
    assert_eq!(console.active_group(), Some(2));
}
