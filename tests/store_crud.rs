mod common;

use authoring_store::domain::{
    Concept, Misconception, MultipleChoiceOption, Operator, ProblemBody, ProblemDifficulty, ProblemKind, StateModule,
};
use authoring_store::remote::{LoginProvider, RemoteError};
use authoring_store::store::ImageUpload;
use authoring_store::StoreError;
use common::{fresh_store, seeded_remote, store_on};

fn empty_module(id: &str) -> StateModule {
    StateModule { id: id.into(), name: "Module".into(), description: "desc".into(), problems: vec![] }
}

fn option(id: &str, text: &str, correct: bool) -> MultipleChoiceOption {
    MultipleChoiceOption { id: id.into(), text: text.into(), is_correct: correct, ..Default::default() }
}

#[tokio::test]
async fn add_new_problem_applies_n_digit_defaults() {
    let (_remote, store) = fresh_store().await;
    store.add_empty_module(&empty_module("m")).await.expect("module added");

    let problem = store
        .add_new_problem("m", ProblemKind::NDigitOperation, "u1")
        .await
        .expect("problem added");

    assert_eq!(problem.created_by, "u1");
    assert_eq!(problem.difficulty, ProblemDifficulty::Easy);
    assert_eq!(
        problem.body,
        ProblemBody::NDigitOperation {
            operand1: "200".into(),
            operand2: "100".into(),
            operator: Operator::Plus,
            include_carry_and_borrow: false,
        }
    );

    let record = store.module_record("m").await.expect("module record");
    assert_eq!(record.problems, vec![problem.id.clone()]);
    let view = store.get_module("m").expect("module in view");
    assert_eq!(view.problems, vec![problem]);
}

#[tokio::test]
async fn add_new_problem_to_missing_module_changes_nothing() {
    let (remote, store) = fresh_store().await;
    store.add_empty_module(&empty_module("m")).await.expect("module added");
    let existing = store.add_new_problem("m", ProblemKind::WordProblem, "u1").await.expect("added");
    let view_before = store.modules();
    let record_before = store.module_record("m").await;
    let problems_before = remote.snapshot("mathProblems").await;
    let modules_before = remote.snapshot("mathModules").await;

    let err = store
        .add_new_problem("missing-id", ProblemKind::MultipleChoice, "u1")
        .await
        .expect_err("unknown module must be rejected");

    assert!(matches!(err, StoreError::ModuleNotFound(ref id) if id == "missing-id"));
    assert_eq!(store.problem_ids().await, vec![existing.id]);
    assert_eq!(store.module_record("m").await, record_before);
    assert!(store.module_record("missing-id").await.is_none());
    assert_eq!(store.modules(), view_before);
    assert_eq!(remote.snapshot("mathProblems").await, problems_before);
    assert_eq!(remote.snapshot("mathModules").await, modules_before);
}

#[tokio::test]
async fn delete_module_cascades_to_its_problems() {
    let (remote, store) = fresh_store().await;
    store.add_empty_module(&empty_module("m")).await.expect("module added");
    store.add_empty_module(&empty_module("keep")).await.expect("module added");
    let mut owned = Vec::new();
    for kind in [ProblemKind::MultipleChoice, ProblemKind::WordProblem, ProblemKind::NDigitOperation] {
        owned.push(store.add_new_problem("m", kind, "u1").await.expect("problem added").id);
    }
    let kept = store.add_new_problem("keep", ProblemKind::WordProblem, "u1").await.expect("problem added");

    store.delete_module("m").await.expect("cascade delete");

    assert!(store.get_module("m").is_none());
    assert!(store.module_record("m").await.is_none());
    for id in &owned {
        assert!(store.problem(id).await.is_none(), "problem {id} should be gone");
    }
    assert!(store.problem(&kept.id).await.is_some());

    let remote_problems = remote.snapshot("mathProblems").await.expect("problems written");
    for id in &owned {
        assert!(remote_problems["problems"].get(id).is_none());
    }
    let remote_modules = remote.snapshot("mathModules").await.expect("modules written");
    assert!(remote_modules["modules"].get("m").is_none());
}

#[tokio::test]
async fn delete_module_of_absent_id_is_a_no_op() {
    let (_remote, store) = fresh_store().await;
    store.delete_module("nope").await.expect("absent module is ignored");
    assert!(store.modules().is_empty());
}

#[tokio::test]
async fn delete_problem_keeps_remaining_order() {
    let (_remote, store) = fresh_store().await;
    store.add_empty_module(&empty_module("m")).await.expect("module added");
    let mut ids = Vec::new();
    for _ in 0..4 {
        ids.push(store.add_new_problem("m", ProblemKind::WordProblem, "u1").await.expect("added").id);
    }

    store.delete_problem(&ids[1], "m").await.expect("problem deleted");

    assert!(store.problem(&ids[1]).await.is_none());
    let expected = vec![ids[0].clone(), ids[2].clone(), ids[3].clone()];
    assert_eq!(store.module_record("m").await.expect("module").problems, expected);
    let view_ids: Vec<String> = store.get_module("m").expect("view").problems.into_iter().map(|p| p.id).collect();
    assert_eq!(view_ids, expected);
}

#[tokio::test]
async fn delete_problem_not_listed_still_deletes_the_record() {
    let (_remote, store) = fresh_store().await;
    store.add_empty_module(&empty_module("a")).await.expect("module added");
    store.add_empty_module(&empty_module("b")).await.expect("module added");
    let p = store.add_new_problem("a", ProblemKind::WordProblem, "u1").await.expect("added");

    store.delete_problem(&p.id, "b").await.expect("listed-or-not, the record goes");

    assert!(store.problem(&p.id).await.is_none());
    // `a` still references the id; the composed view drops the dangling entry.
    assert_eq!(store.module_record("a").await.expect("module").problems, vec![p.id.clone()]);
    assert!(store.get_module("a").expect("view").problems.is_empty());
}

#[tokio::test]
async fn delete_problem_requires_the_module() {
    let (_remote, store) = fresh_store().await;
    let err = store.delete_problem("p", "missing").await.expect_err("module must exist");
    assert!(matches!(err, StoreError::ModuleNotFound(_)));
}

#[tokio::test]
async fn update_problem_replaces_options_by_value() {
    let (_remote, store) = fresh_store().await;
    store.add_empty_module(&empty_module("m")).await.expect("module added");
    let mut problem = store.add_new_problem("m", ProblemKind::MultipleChoice, "author").await.expect("added");
    problem.body = ProblemBody::MultipleChoice { options: vec![option("o1", "3", false), option("o2", "4", true)] };
    store.update_problem("m", &problem).await.expect("first update");

    let mut edited = problem.clone();
    edited.title = "2 + 2".into();
    edited.created_by = "someone-else".into();
    edited.ai_prompt = "ignored".into();
    edited.body = ProblemBody::MultipleChoice { options: vec![option("o1", "5", false), option("o2", "4", true)] };
    store.update_problem("m", &edited).await.expect("second update");

    // Mutating the caller's copy afterwards must not reach the store.
    if let ProblemBody::MultipleChoice { options } = &mut edited.body {
        options[0].text = "mutated".into();
    }

    let stored = store.problem(&problem.id).await.expect("stored");
    assert_eq!(stored.title, "2 + 2");
    assert_eq!(
        stored.body,
        ProblemBody::MultipleChoice { options: vec![option("o1", "5", false), option("o2", "4", true)] }
    );
    assert_eq!(stored.created_by, "author");
    assert_eq!(stored.ai_prompt, "");
    assert_eq!(stored.created_at, problem.created_at);
    assert!(stored.updated_at >= problem.updated_at);
    assert_eq!(store.get_module("m").expect("view").problems[0], stored);
}

#[tokio::test]
async fn update_problem_can_switch_kind() {
    let (_remote, store) = fresh_store().await;
    store.add_empty_module(&empty_module("m")).await.expect("module added");
    let mut problem = store.add_new_problem("m", ProblemKind::MultipleChoice, "u1").await.expect("added");
    problem.body = ProblemBody::NDigitOperation {
        operand1: "345".into(),
        operand2: "178".into(),
        operator: Operator::Minus,
        include_carry_and_borrow: true,
    };

    store.update_problem("m", &problem).await.expect("kind switch");

    let stored = store.problem(&problem.id).await.expect("stored");
    assert_eq!(stored.kind(), ProblemKind::NDigitOperation);
    assert_eq!(stored.body, problem.body);
}

#[tokio::test]
async fn update_problem_checks_module_and_membership() {
    let (_remote, store) = fresh_store().await;
    store.add_empty_module(&empty_module("a")).await.expect("module added");
    store.add_empty_module(&empty_module("b")).await.expect("module added");
    let problem = store.add_new_problem("a", ProblemKind::WordProblem, "u1").await.expect("added");

    let err = store.update_problem("missing", &problem).await.expect_err("module must exist");
    assert!(matches!(err, StoreError::ModuleNotFound(_)));

    let err = store.update_problem("b", &problem).await.expect_err("problem must be listed");
    assert!(matches!(err, StoreError::ProblemNotInModule { ref module_id, .. } if module_id == "b"));
}

#[tokio::test]
async fn update_module_name_description_ignores_unknown_ids() {
    let (_remote, store) = fresh_store().await;
    store.update_module_name_description("ghost", "x", "y").await.expect("silent no-op");
    assert!(store.modules().is_empty());

    store.add_empty_module(&empty_module("m")).await.expect("module added");
    store.update_module_name_description("m", "Fractions", "halves and quarters").await.expect("updated");
    let view = store.get_module("m").expect("view");
    assert_eq!(view.name, "Fractions");
    assert_eq!(view.description, "halves and quarters");
}

#[tokio::test]
async fn reads_reflect_writes_immediately() {
    let (_remote, store) = fresh_store().await;
    let read = store.modules_fn();
    assert!(read().is_empty());

    store.add_empty_module(&empty_module("m")).await.expect("module added");
    assert!(read().contains_key("m"));

    let problem = store.add_new_problem("m", ProblemKind::WordProblem, "u1").await.expect("added");
    assert_eq!(read()["m"].problems[0].id, problem.id);
}

#[tokio::test]
async fn add_concept_merges_over_remote_record() {
    let remote = seeded_remote();
    remote
        .push_external("c1", serde_json::json!({ "id": "c1", "name": "old", "aiPrompt": "stale prompt" }))
        .await;
    let store = store_on(&remote).await;

    let concept = Concept {
        id: "c1".into(),
        name: "Place value".into(),
        description: "tens and ones".into(),
        related_concepts: vec!["c2".into()],
        ai_prompt: "Explain place value".into(),
    };
    let stored = store.add_concept(&concept).await.expect("concept added");

    assert_eq!(stored, concept);
    assert_eq!(store.get_concept("c1"), Some(concept.clone()));
    assert_eq!(store.concepts_fn()().len(), 1);
    let remote_concepts = remote.snapshot("mathConcepts").await.expect("written");
    assert_eq!(remote_concepts["concepts"]["c1"]["name"], "Place value");
}

#[tokio::test]
async fn update_concept_overwrites_fields_or_fails() {
    let (_remote, store) = fresh_store().await;
    let missing = Concept { id: "nope".into(), ..Concept::default() };
    let err = store.update_concept(&missing).await.expect_err("absent concept");
    assert!(matches!(err, StoreError::ConceptNotFound(_)));

    let mut concept = Concept { id: "c1".into(), name: "Carry".into(), ..Concept::default() };
    store.add_concept(&concept).await.expect("added");
    concept.name = "Carrying".into();
    concept.related_concepts = vec!["c7".into(), "c8".into()];
    store.update_concept(&concept).await.expect("updated");
    concept.related_concepts.clear();

    let stored = store.get_concept("c1").expect("stored");
    assert_eq!(stored.name, "Carrying");
    assert_eq!(stored.related_concepts, vec!["c7".to_string(), "c8".to_string()]);
}

#[tokio::test]
async fn misconceptions_add_and_update() {
    let (_remote, store) = fresh_store().await;
    let mut m = Misconception {
        id: "mc1".into(),
        name: "Adds denominators".into(),
        ai_definition: "Student adds both numerators and denominators".into(),
        ai_feedback: String::new(),
    };
    store.add_misconception(&m).await.expect("added");
    m.ai_feedback = "Find a common denominator first".into();
    store.update_misconception(&m).await.expect("updated");

    assert_eq!(store.get_misconception("mc1"), Some(m.clone()));
    assert_eq!(store.misconceptions().len(), 1);

    let err = store
        .update_misconception(&Misconception { id: "ghost".into(), ..Misconception::default() })
        .await
        .expect_err("absent misconception");
    assert!(matches!(err, StoreError::MisconceptionNotFound(_)));
}

#[tokio::test]
async fn remote_failure_surfaces_to_the_caller() {
    let (remote, store) = fresh_store().await;
    remote.set_offline(true).await;

    let err = store.add_empty_module(&empty_module("m")).await.expect_err("remote is down");
    assert!(matches!(err, StoreError::Remote(RemoteError::Unavailable(_))));

    let err = store.add_concept(&Concept { id: "c".into(), ..Concept::default() }).await.expect_err("down");
    assert!(matches!(err, StoreError::Remote(_)));
    assert!(store.get_concept("c").is_none());
}

#[tokio::test]
async fn cascade_reports_partial_remote_failure() {
    let (remote, store) = fresh_store().await;
    store.add_empty_module(&empty_module("m")).await.expect("module added");
    let p = store.add_new_problem("m", ProblemKind::WordProblem, "u1").await.expect("added");
    remote.fail_saves_to("mathModules").await;

    let err = store.delete_module("m").await.expect_err("module write fails");
    match err {
        StoreError::CascadeIncomplete { module_id, failures } => {
            assert_eq!(module_id, "m");
            assert_eq!(failures.len(), 1);
        }
        other => panic!("unexpected error: {other}"),
    }

    // Local removal completed; the problems write still went through.
    assert!(store.get_module("m").is_none());
    assert!(store.problem(&p.id).await.is_none());
    let remote_problems = remote.snapshot("mathProblems").await.expect("written");
    assert!(remote_problems["problems"].get(&p.id).is_none());
}

#[tokio::test]
async fn images_and_session_pass_through() {
    let (remote, store) = fresh_store().await;
    let id = store
        .upload_image(ImageUpload { name: "apple.png".into(), mime_type: "image/png".into(), data: vec![1, 2, 3] })
        .await
        .expect("uploaded");
    assert_eq!(remote.upload_count().await, 1);
    assert_eq!(store.get_image_url(&id).await.expect("url"), format!("memory://uploads/{id}"));

    let err = store.get_image_url("unknown").await.expect_err("not uploaded");
    assert!(matches!(err, StoreError::Remote(RemoteError::NotFound(_))));

    store.login(LoginProvider::Google).await.expect("login");
    assert_eq!(store.environment().await.expect("env").provider, Some(LoginProvider::Google));
    store.logout().await.expect("logout");
    assert_eq!(store.environment().await.expect("env").user, None);
    assert_ne!(store.uuid(), store.uuid());
}
