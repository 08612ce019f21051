mod common;

use common::{values, World};
use entity_query::query::{entity, eq, Variable};
use entity_query::{
    an, match_, the, Answer, EvaluatorOptions, QueryError, Result, ResultQuantificationConstraint,
    Value,
};

fn values_of(answers: impl IntoIterator<Item = Result<Answer>>) -> Result<Vec<Value>> {
    answers
        .into_iter()
        .map(|answer| answer.map(|a| a.into_value().unwrap_or(Value::Null)))
        .collect()
}

#[test]
fn an_yields_every_solution_in_domain_order() -> Result<()> {
    let world = World::new()?;
    let evaluator = world.evaluator();
    let handles = an(match_("Handle").compile(&world.catalog)?);

    let first = values_of(handles.evaluate(&evaluator))?;
    assert_eq!(first, values([&world.h1, &world.h2]));
    let second = values_of(handles.evaluate(&evaluator))?;
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn answers_restart_from_the_beginning() -> Result<()> {
    let world = World::new()?;
    let evaluator = world.evaluator();
    let bodies = an(match_("Body").compile(&world.catalog)?);
    let mut answers = bodies.evaluate(&evaluator);
    assert!(answers.next().transpose()?.is_some());
    assert!(answers.next().transpose()?.is_some());
    assert_eq!(answers.produced(), 2);

    answers.restart();
    assert_eq!(answers.produced(), 0);
    let all = values_of(answers)?;
    assert_eq!(all.len(), 10);
    assert_eq!(all[0], Value::from(&world.c1));
    Ok(())
}

#[test]
fn the_requires_exactly_one_answer() -> Result<()> {
    let world = World::new()?;
    let evaluator = world.evaluator();

    let one = the(match_("Handle").with("name", "H2").compile(&world.catalog)?);
    assert_eq!(
        one.evaluate(&evaluator)?.into_value(),
        Some(Value::from(&world.h2))
    );

    let none = the(match_("Handle").with("name", "H9").compile(&world.catalog)?);
    assert_eq!(
        none.evaluate(&evaluator),
        Err(QueryError::NotExactlyOneResult { found: 0 })
    );

    let two = the(match_("Handle").compile(&world.catalog)?);
    assert_eq!(
        two.evaluate(&evaluator),
        Err(QueryError::NotExactlyOneResult { found: 2 })
    );
    Ok(())
}

#[test]
fn constraints_fail_as_soon_as_they_are_decided() -> Result<()> {
    let world = World::new()?;
    let evaluator = world.evaluator();
    let handles = match_("Handle").compile(&world.catalog)?;

    let exactly = an(handles.clone()).with_constraint(ResultQuantificationConstraint::Exactly { n: 2 });
    assert_eq!(exactly.collect(&evaluator)?.len(), 2);

    let at_most = an(handles.clone()).with_constraint(ResultQuantificationConstraint::AtMost { n: 1 });
    let mut answers = at_most.evaluate(&evaluator);
    assert!(matches!(answers.next(), Some(Ok(_))));
    assert_eq!(
        answers.next(),
        Some(Err(QueryError::QuantificationNotSatisfied {
            constraint: "at most 1".into(),
            found: 2,
        }))
    );
    assert!(answers.next().is_none());

    let at_least = an(handles).with_constraint(ResultQuantificationConstraint::AtLeast { n: 3 });
    let mut answers = at_least.evaluate(&evaluator);
    assert!(matches!(answers.next(), Some(Ok(_))));
    assert!(matches!(answers.next(), Some(Ok(_))));
    assert!(matches!(
        answers.next(),
        Some(Err(QueryError::QuantificationNotSatisfied { found: 2, .. }))
    ));
    Ok(())
}

#[test]
fn unqueryable_types_need_an_explicit_domain() -> Result<()> {
    let world = World::new()?;
    let evaluator = world.evaluator();
    let note = Variable::new("Note").named("note");
    let query = an(entity(&note, None));
    let mut answers = query.evaluate(&evaluator);
    assert_eq!(
        answers.next(),
        Some(Err(QueryError::DomainUnavailable {
            var: "note".into(),
            ty: "Note".into(),
        }))
    );
    assert!(answers.next().is_none());

    let scribble = entity_query::Record::new("Note", [("text", "buy hinges")]);
    let explicit = Variable::with_domain("Note", [Value::from(&scribble), Value::from("noise")]);
    let answers = values_of(an(entity(&explicit, None)).evaluate(&evaluator))?;
    assert_eq!(answers, vec![Value::from(&scribble)]);
    Ok(())
}

#[test]
fn distinct_answers_can_be_disabled() -> Result<()> {
    let world = World::new()?;
    let query = match_("Cabinet")
        .with("drawers", vec![world.d1.clone(), world.d2.clone()])
        .compile(&world.catalog)?;
    let descriptor = query.descriptor();

    let distinct = world.evaluator();
    assert_eq!(values_of(distinct.evaluate(descriptor))?, values([&world.cab1]));

    let raw = world.evaluator_with(EvaluatorOptions::default().with_distinct_answers(false));
    assert_eq!(
        values_of(raw.evaluate(descriptor))?,
        values([&world.cab1, &world.cab1])
    );
    Ok(())
}

#[test]
fn profiling_counts_enumerated_rows() -> Result<()> {
    let world = World::new()?;
    let evaluator = world.evaluator_with(EvaluatorOptions::default().with_profile(true));
    let query = an(match_("Handle").with("name", "H1").compile(&world.catalog)?);
    assert_eq!(query.collect(&evaluator)?.len(), 1);

    let snapshot = evaluator.profile_snapshot(true).expect("profiling enabled");
    assert!(snapshot.rows_enumerated >= 2);
    assert_eq!(snapshot.rows_rejected, 1);
    assert_eq!(snapshot.project_count, 1);
    let cleared = evaluator.profile_snapshot(false).expect("profiling enabled");
    assert_eq!(cleared.rows_enumerated, 0);

    assert!(world.evaluator().profile_snapshot(false).is_none());
    Ok(())
}

#[test]
fn registry_domains_are_scanned_once_per_evaluation() -> Result<()> {
    let world = World::new()?;
    let evaluator = world.evaluator_with(EvaluatorOptions::default().with_profile(true));
    let connection = Variable::new("FixedConnection");
    let container = Variable::new("Container");
    let joined = entity(
        &connection,
        [eq(connection.attr(&world.catalog, "parent")?, &container)],
    );

    let mut answers = evaluator.evaluate(&joined);
    assert_eq!(
        values_of(answers.by_ref())?,
        values([&world.fixed1, &world.fixed2])
    );
    let snapshot = evaluator.profile_snapshot(true).expect("profiling enabled");
    assert_eq!(snapshot.registry_scans, 2);

    answers.restart();
    assert_eq!(answers.count(), 2);
    let snapshot = evaluator.profile_snapshot(true).expect("profiling enabled");
    assert_eq!(snapshot.registry_scans, 2);
    Ok(())
}
