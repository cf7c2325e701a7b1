// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, anyhow};
use querylens_app::{
    AnalyticsSource, Interaction, QuerySelection, Session, SessionEvent, SourceKind,
    TableCommand, View, WAREHOUSE_KPI_COLUMNS,
};
use querylens_testkit::FixtureSource;

/// Run every fetch the session asks for, synchronously, until it settles.
fn settle(session: &mut Session, source: &FixtureSource, events: Vec<SessionEvent>) -> Vec<SessionEvent> {
    let mut queue = events;
    let mut seen = Vec::new();
    while let Some(event) = queue.pop() {
        if let SessionEvent::Fetch(ticket) = &event {
            let outcome = source.fetch(&ticket.request);
            queue.extend(session.complete(ticket.id, outcome));
        }
        seen.push(event);
    }
    seen
}

fn first_positive_cell(session: &Session) -> Option<(usize, String)> {
    let view = session.table_view()?;
    view.rows.iter().enumerate().find_map(|(index, row)| {
        WAREHOUSE_KPI_COLUMNS
            .iter()
            .find(|column| row.number(column).is_some_and(|n| n > 0.0))
            .map(|column| (index, (*column).to_owned()))
    })
}

#[test]
fn warehouse_to_query_detail_and_back() -> Result<()> {
    let source = FixtureSource::seeded(5);
    let mut session = Session::new(SourceKind::Warehouse, 50);
    let start = session.start();
    settle(&mut session, &source, start);
    assert_eq!(session.stack().depth(), 1);

    let (row, column) = first_positive_cell(&session).ok_or_else(|| anyhow!("no drillable cell"))?;
    let events = session.handle(Interaction::ActivateCell { row, column });
    settle(&mut session, &source, events);
    let drill = session.current_view().clone();
    assert!(matches!(drill, View::DrillDown { .. }));
    let drill_rows = session
        .table_view()
        .map(|view| view.counts.total_in_source)
        .unwrap_or(0);
    assert!(drill_rows > 0);

    let events = session.handle(Interaction::ViewQueries { row: 0 });
    settle(&mut session, &source, events);
    let View::QueryList { selection, .. } = session.current_view().clone() else {
        return Err(anyhow!("expected query list, got {:?}", session.current_view()));
    };
    let QuerySelection::Ids { ids, .. } = selection else {
        return Err(anyhow!("expected id selection"));
    };
    assert_eq!(
        session.table_view().map(|view| view.counts.total_in_source),
        Some(ids.len())
    );

    let events = session.handle(Interaction::ViewDetails { row: 0 });
    settle(&mut session, &source, events);
    assert!(session.overlay().record().is_some());
    assert_eq!(session.stack().depth(), 3);

    session.handle(Interaction::CloseOverlay);
    let events = session.handle(Interaction::Back);
    settle(&mut session, &source, events);
    assert_eq!(session.current_view(), &drill);

    let events = session.handle(Interaction::Home);
    settle(&mut session, &source, events);
    assert_eq!(session.current_view(), &View::RootList(SourceKind::Warehouse));
    Ok(())
}

#[test]
fn search_and_export_follow_the_table_query() -> Result<()> {
    let source = FixtureSource::seeded(8);
    let mut session = Session::new(SourceKind::User, 5);
    let start = session.start();
    settle(&mut session, &source, start);

    let first_user = session
        .row(0)
        .map(|row| row.text("USER_NAME"))
        .ok_or_else(|| anyhow!("users loaded"))?;
    session.handle(Interaction::Table(TableCommand::SetSearch(first_user.clone())));
    let export = session.export()?;
    assert_eq!(export.file_name, "Users.csv");
    assert!(export.rows >= 1);
    assert!(export.contents.contains(&first_user));
    Ok(())
}

#[test]
fn failing_backend_leaves_a_retryable_notice() {
    let source = FixtureSource::seeded(1)
        .failing(querylens_app::FetchError::transport("http://127.0.0.1:1", "refused"));
    let mut session = Session::new(SourceKind::Warehouse, 50);
    let start = session.start();
    settle(&mut session, &source, start);

    let notice = session.notice().expect("notice raised");
    assert!(notice.retry.is_some());
    assert!(session.table_view().is_none());
}
