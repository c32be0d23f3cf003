use tracing::{debug, info};

use crate::error::SessionError;
use crate::model::{viewer_url, Candidate, Collection, Cursor, Outcome, Seed};
use crate::store::PersistenceGateway;

// ── Mutation intents ────────────────────────────────────────────────────────

/// Link fields read from the viewer for one candidate.
#[derive(Clone, Debug, PartialEq)]
pub struct Capture {
    pub captured_image_ref: String,
    pub source_view_ref: String,
    pub extracted_image_url: Option<String>,
}

/// A full snapshot ready to hand to the gateway. `fetch_image` names the
/// candidate whose image should be downloaded alongside the write.
#[derive(Clone, Debug, PartialEq)]
pub struct PersistRequest {
    pub snapshot: Collection,
    pub fetch_image: Option<Cursor>,
}

// ── Session ─────────────────────────────────────────────────────────────────

/// Cursor plus the last collection confirmed by the store.
///
/// The collection is only ever replaced wholesale, either by [`load`] or by
/// the snapshot a persistence round trip returns. A `None` cursor means
/// navigation ran past the first or last eligible seed, or nothing is
/// eligible at all.
///
/// [`load`]: AnnotationSession::load
#[derive(Debug, Default)]
pub struct AnnotationSession {
    collection: Collection,
    cursor: Option<Cursor>,
}

impl AnnotationSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the collection and resume at the first eligible seed nobody
    /// has worked on yet, falling back to the first eligible seed.
    pub fn load(&mut self, collection: Collection) {
        self.collection = collection;
        let fresh = self
            .collection
            .iter()
            .position(|seed| seed.is_eligible() && seed.is_untouched());
        let seed = fresh.or_else(|| self.collection.iter().position(Seed::is_eligible));
        self.cursor = seed.map(|seed| Cursor::new(seed, 0));
        info!(
            seeds = self.collection.len(),
            cursor = ?self.cursor,
            "collection loaded"
        );
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    pub fn cursor(&self) -> Option<Cursor> {
        self.cursor
    }

    pub fn data_is_available(&self) -> bool {
        !self.collection.is_empty()
    }

    fn is_eligible(&self, seed: usize) -> bool {
        self.collection.get(seed).is_some_and(Seed::is_eligible)
    }

    pub fn current_seed(&self) -> Option<&Seed> {
        self.cursor.and_then(|c| self.collection.get(c.seed))
    }

    pub fn current_candidate(&self) -> Option<&Candidate> {
        let cursor = self.cursor?;
        self.collection
            .get(cursor.seed)?
            .candidates()
            .get(cursor.candidate)
    }

    pub fn viewer_url(&self, host: &str) -> Option<String> {
        self.current_candidate()
            .map(|candidate| viewer_url(host, candidate.location()))
    }

    /// Outcomes of every candidate of the current seed, in order.
    pub fn candidate_outcomes(&self) -> Vec<Outcome> {
        self.current_seed()
            .map(|seed| seed.candidates().iter().map(Candidate::outcome).collect())
            .unwrap_or_default()
    }

    // ── Navigation ──────────────────────────────────────────────────────────

    pub fn next_seed(&mut self) {
        let Some(cursor) = self.cursor else {
            return;
        };
        let next = (cursor.seed + 1..self.collection.len()).find(|&i| self.is_eligible(i));
        self.cursor = next.map(|seed| Cursor::new(seed, 0));
        debug!(cursor = ?self.cursor, "next seed");
    }

    /// Moves to candidate 0 of the nearest eligible seed before this one.
    pub fn previous_seed(&mut self) {
        let Some(cursor) = self.cursor else {
            return;
        };
        let previous = (0..cursor.seed).rev().find(|&i| self.is_eligible(i));
        self.cursor = previous.map(|seed| Cursor::new(seed, 0));
        debug!(cursor = ?self.cursor, "previous seed");
    }

    /// Past the last candidate of a seed this continues with the next seed.
    pub fn next_candidate(&mut self) {
        let Some(cursor) = self.cursor else {
            return;
        };
        let Some(seed) = self.collection.get(cursor.seed) else {
            self.cursor = None;
            return;
        };
        if cursor.candidate + 1 >= seed.candidates().len() {
            self.next_seed();
        } else {
            self.cursor = Some(Cursor::new(cursor.seed, cursor.candidate + 1));
        }
    }

    /// From candidate 0 this lands on candidate 0 of the previous seed, not
    /// on its last candidate.
    pub fn previous_candidate(&mut self) {
        let Some(cursor) = self.cursor else {
            return;
        };
        if cursor.candidate == 0 {
            self.previous_seed();
        } else {
            self.cursor = Some(Cursor::new(cursor.seed, cursor.candidate - 1));
        }
    }

    /// Jump to a candidate of the current seed. Out of range is ignored.
    pub fn select_candidate(&mut self, candidate: usize) {
        let Some(cursor) = self.cursor else {
            return;
        };
        let in_range = self
            .collection
            .get(cursor.seed)
            .is_some_and(|seed| candidate < seed.candidates().len());
        if in_range {
            self.cursor = Some(Cursor::new(cursor.seed, candidate));
        }
    }

    // ── Progress ────────────────────────────────────────────────────────────

    fn eligible_candidates(&self) -> impl Iterator<Item = &Candidate> {
        self.collection
            .iter()
            .filter(|seed| seed.is_eligible())
            .flat_map(|seed| seed.candidates())
    }

    pub fn total_eligible_candidate_count(&self) -> usize {
        self.eligible_candidates().count()
    }

    pub fn annotated_candidate_count(&self) -> usize {
        self.eligible_candidates()
            .filter(|candidate| candidate.is_annotated())
            .count()
    }

    /// `None` when there is nothing eligible to annotate.
    pub fn percent_complete(&self) -> Option<f32> {
        let total = self.total_eligible_candidate_count();
        if total == 0 {
            return None;
        }
        Some(100.0 * self.annotated_candidate_count() as f32 / total as f32)
    }

    // ── Mutation ────────────────────────────────────────────────────────────

    fn edit_current(
        &self,
        edit: impl FnOnce(&mut Candidate),
    ) -> Result<(Collection, Cursor), SessionError> {
        let cursor = self.cursor.ok_or(SessionError::NoCurrentCandidate)?;
        let mut snapshot = self.collection.clone();
        let candidate = snapshot
            .get_mut(cursor.seed)
            .and_then(|seed| seed.nearby.results.get_mut(cursor.candidate))
            .ok_or(SessionError::NoCurrentCandidate)?;
        edit(candidate);
        Ok((snapshot, cursor))
    }

    /// Snapshot with the current candidate's link fields filled in. The live
    /// collection is left untouched until the store confirms the write.
    pub fn prepare_capture(&self, capture: Capture) -> Result<PersistRequest, SessionError> {
        let (snapshot, cursor) = self.edit_current(|candidate| {
            candidate.captured_image_ref = Some(capture.captured_image_ref);
            candidate.source_view_ref = Some(capture.source_view_ref);
            candidate.extracted_image_url = capture.extracted_image_url;
        })?;
        Ok(PersistRequest {
            snapshot,
            fetch_image: Some(cursor),
        })
    }

    /// Snapshot with the current candidate marked unusable.
    pub fn prepare_bad(&self) -> Result<PersistRequest, SessionError> {
        let (snapshot, _) = self.edit_current(Candidate::mark_bad)?;
        Ok(PersistRequest {
            snapshot,
            fetch_image: None,
        })
    }

    /// Adopt the snapshot the store returned and move on.
    pub fn apply_persisted(&mut self, snapshot: Collection) {
        self.collection = snapshot;
        self.next_candidate();
        debug!(cursor = ?self.cursor, "applied persisted snapshot");
    }

    pub fn record_capture<G>(&mut self, gateway: &G, capture: Capture) -> Result<(), SessionError>
    where
        G: PersistenceGateway + ?Sized,
    {
        let request = self.prepare_capture(capture)?;
        let snapshot = gateway.persist(&request.snapshot, request.fetch_image)?;
        self.apply_persisted(snapshot);
        Ok(())
    }

    pub fn record_bad<G>(&mut self, gateway: &G) -> Result<(), SessionError>
    where
        G: PersistenceGateway + ?Sized,
    {
        let request = self.prepare_bad()?;
        let snapshot = gateway.persist(&request.snapshot, request.fetch_image)?;
        self.apply_persisted(snapshot);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use rstest::{fixture, rstest};
    use serde_json::Map;

    use super::*;
    use crate::error::StoreError;
    use crate::model::{Location, NearbyQuery, UNUSABLE};

    fn seed(status: &str, candidates: usize) -> Seed {
        Seed {
            nearby: NearbyQuery {
                status: status.to_string(),
                results: (0..candidates)
                    .map(|i| Candidate::new(Location::new(i as f64, -(i as f64))))
                    .collect(),
                extra: Map::new(),
            },
            extra: Map::new(),
        }
    }

    fn session_with(collection: Collection) -> AnnotationSession {
        let mut session = AnnotationSession::new();
        session.load(collection);
        session
    }

    /// Seeds: [OK, 2], [ZERO_RESULTS, 0], [OK, 1].
    #[fixture]
    fn scenario() -> AnnotationSession {
        session_with(vec![seed("OK", 2), seed("ZERO_RESULTS", 0), seed("OK", 1)])
    }

    /// Stands in for the JSON store: remembers writes and echoes them back.
    #[derive(Default)]
    struct EchoGateway {
        writes: RefCell<Vec<PersistRequest>>,
    }

    impl PersistenceGateway for EchoGateway {
        fn load_collection(&self) -> Result<Collection, StoreError> {
            Ok(self
                .writes
                .borrow()
                .last()
                .map(|w| w.snapshot.clone())
                .unwrap_or_default())
        }

        fn persist(
            &self,
            collection: &Collection,
            fetch_image: Option<Cursor>,
        ) -> Result<Collection, StoreError> {
            self.writes.borrow_mut().push(PersistRequest {
                snapshot: collection.clone(),
                fetch_image,
            });
            Ok(collection.clone())
        }
    }

    struct FailingGateway;

    impl PersistenceGateway for FailingGateway {
        fn load_collection(&self) -> Result<Collection, StoreError> {
            Err(StoreError::Io {
                path: "missing.json".into(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            })
        }

        fn persist(&self, _: &Collection, _: Option<Cursor>) -> Result<Collection, StoreError> {
            self.load_collection()
        }
    }

    fn capture(link: &str) -> Capture {
        Capture {
            captured_image_ref: link.to_string(),
            source_view_ref: format!("https://viewer/{link}"),
            extracted_image_url: Some(format!("https://img/{link}.jpg")),
        }
    }

    #[rstest]
    fn walks_scenario_forward(mut scenario: AnnotationSession) {
        assert_eq!(scenario.cursor(), Some(Cursor::new(0, 0)));
        scenario.next_candidate();
        assert_eq!(scenario.cursor(), Some(Cursor::new(0, 1)));
        scenario.next_candidate();
        assert_eq!(scenario.cursor(), Some(Cursor::new(2, 0)));
        scenario.next_candidate();
        assert_eq!(scenario.cursor(), None);
    }

    #[rstest]
    fn counts_only_eligible_candidates(scenario: AnnotationSession) {
        assert_eq!(scenario.total_eligible_candidate_count(), 3);
        assert_eq!(scenario.annotated_candidate_count(), 0);
        assert_eq!(scenario.percent_complete(), Some(0.0));
    }

    #[test]
    fn ignores_candidates_of_failed_queries() {
        let session = session_with(vec![seed("ZERO_RESULTS", 4), seed("OK", 1)]);
        assert_eq!(session.total_eligible_candidate_count(), 1);
        assert_eq!(session.cursor(), Some(Cursor::new(1, 0)));
    }

    #[rstest]
    fn exhausted_cursor_stays_undefined(mut scenario: AnnotationSession) {
        for _ in 0..3 {
            scenario.next_candidate();
        }
        assert_eq!(scenario.cursor(), None);
        for _ in 0..5 {
            scenario.next_candidate();
            scenario.previous_candidate();
            scenario.next_seed();
            scenario.previous_seed();
            scenario.select_candidate(0);
            assert_eq!(scenario.cursor(), None);
        }
        assert!(scenario.current_candidate().is_none());
        assert!(scenario.viewer_url("host").is_none());
    }

    #[rstest]
    fn previous_seed_resets_to_first_candidate(mut scenario: AnnotationSession) {
        scenario.next_seed();
        assert_eq!(scenario.cursor(), Some(Cursor::new(2, 0)));
        scenario.previous_candidate();
        assert_eq!(scenario.cursor(), Some(Cursor::new(0, 0)));
        scenario.previous_candidate();
        assert_eq!(scenario.cursor(), None);
    }

    #[rstest]
    fn previous_candidate_steps_within_seed(mut scenario: AnnotationSession) {
        scenario.select_candidate(1);
        scenario.previous_candidate();
        assert_eq!(scenario.cursor(), Some(Cursor::new(0, 0)));
    }

    #[rstest]
    fn select_candidate_ignores_out_of_range(mut scenario: AnnotationSession) {
        scenario.select_candidate(7);
        assert_eq!(scenario.cursor(), Some(Cursor::new(0, 0)));
        scenario.select_candidate(1);
        assert_eq!(scenario.cursor(), Some(Cursor::new(0, 1)));
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(2)]
    #[case(3)]
    #[case(4)]
    fn seed_navigation_skips_ineligible_from_any_start(#[case] start: usize) {
        let collection = vec![
            seed("OK", 1),
            seed("ZERO_RESULTS", 0),
            seed("OK", 0),
            seed("INVALID_REQUEST", 2),
            seed("OK", 3),
        ];
        let eligible = [0, 4];
        let mut session = session_with(collection);
        session.cursor = Some(Cursor::new(start, 0));
        session.next_seed();
        let expected = eligible.iter().copied().find(|&i| i > start);
        assert_eq!(session.cursor().map(|c| c.seed), expected);

        session.cursor = Some(Cursor::new(start, 0));
        session.previous_seed();
        let expected = eligible.iter().rev().copied().find(|&i| i < start);
        assert_eq!(session.cursor().map(|c| c.seed), expected);
    }

    #[test]
    fn load_resumes_at_first_untouched_seed() {
        let mut collection = vec![seed("OK", 2), seed("OK", 2), seed("OK", 1)];
        collection[0].nearby.results[0].mark_bad();
        collection[1].nearby.results[1].captured_image_ref = Some("link".into());
        let session = session_with(collection);
        assert_eq!(session.cursor(), Some(Cursor::new(2, 0)));
    }

    #[test]
    fn load_falls_back_to_first_eligible_seed() {
        let mut collection = vec![seed("ZERO_RESULTS", 0), seed("OK", 1)];
        collection[1].nearby.results[0].mark_bad();
        let session = session_with(collection);
        assert_eq!(session.cursor(), Some(Cursor::new(1, 0)));
    }

    #[rstest]
    #[case(vec![])]
    #[case(vec![seed("ZERO_RESULTS", 0), seed("OK", 0)])]
    fn load_without_eligible_seeds_has_no_cursor(#[case] collection: Collection) {
        let session = session_with(collection);
        assert_eq!(session.cursor(), None);
        assert_eq!(session.percent_complete(), None);
        assert!(session.candidate_outcomes().is_empty());
    }

    #[rstest]
    fn record_bad_marks_and_advances(mut scenario: AnnotationSession) {
        let gateway = EchoGateway::default();
        scenario.next_seed();
        scenario.record_bad(&gateway).unwrap();

        let station = &scenario.collection()[2].candidates()[0];
        assert_eq!(station.captured_image_ref.as_deref(), Some(UNUSABLE));
        assert_eq!(station.source_view_ref.as_deref(), Some(UNUSABLE));
        assert_eq!(station.outcome(), Outcome::MarkedBad);
        assert_eq!(scenario.annotated_candidate_count(), 1);
        assert_eq!(scenario.cursor(), None);
        assert_eq!(gateway.writes.borrow()[0].fetch_image, None);
    }

    #[rstest]
    fn record_capture_requests_image_for_current_pair(mut scenario: AnnotationSession) {
        let gateway = EchoGateway::default();
        scenario.select_candidate(1);
        scenario.record_capture(&gateway, capture("b")).unwrap();

        assert_eq!(
            gateway.writes.borrow()[0].fetch_image,
            Some(Cursor::new(0, 1))
        );
        let station = &scenario.collection()[0].candidates()[1];
        assert_eq!(station.outcome(), Outcome::Captured);
        assert_eq!(station.extracted_image_url.as_deref(), Some("https://img/b.jpg"));
        assert_eq!(scenario.cursor(), Some(Cursor::new(2, 0)));
    }

    #[rstest]
    fn progress_never_decreases(mut scenario: AnnotationSession) {
        let gateway = EchoGateway::default();
        let mut last = scenario.percent_complete().unwrap();
        scenario.record_capture(&gateway, capture("a")).unwrap();
        scenario.previous_candidate();
        scenario.record_bad(&gateway).unwrap();
        scenario.record_capture(&gateway, capture("b")).unwrap();
        scenario.record_bad(&gateway).unwrap();
        assert_eq!(scenario.cursor(), None);
        for request in gateway.writes.borrow().iter() {
            let mut replay = AnnotationSession::new();
            replay.load(request.snapshot.clone());
            let now = replay.percent_complete().unwrap();
            assert!(now >= last);
            assert!(replay.annotated_candidate_count() <= replay.total_eligible_candidate_count());
            last = now;
        }
        assert_eq!(last, 100.0);
    }

    #[rstest]
    fn snapshot_from_store_replaces_local_edit(mut scenario: AnnotationSession) {
        let request = scenario.prepare_capture(capture("a")).unwrap();
        assert!(scenario.collection()[0].is_untouched());

        let mut canonical = request.snapshot.clone();
        canonical[0].nearby.results[0].captured_image_ref = Some("canonical".into());
        scenario.apply_persisted(canonical);
        assert_eq!(
            scenario.collection()[0].candidates()[0]
                .captured_image_ref
                .as_deref(),
            Some("canonical")
        );
        assert_eq!(scenario.cursor(), Some(Cursor::new(0, 1)));
    }

    #[rstest]
    fn failed_persist_leaves_session_untouched(mut scenario: AnnotationSession) {
        let err = scenario.record_bad(&FailingGateway).unwrap_err();
        assert!(matches!(err, SessionError::Store(StoreError::Io { .. })));
        assert!(scenario.collection()[0].is_untouched());
        assert_eq!(scenario.cursor(), Some(Cursor::new(0, 0)));
    }

    #[test]
    fn mutation_without_cursor_is_rejected() {
        let session = session_with(vec![seed("ZERO_RESULTS", 0)]);
        assert!(matches!(
            session.prepare_bad(),
            Err(SessionError::NoCurrentCandidate)
        ));
    }

    #[test]
    fn shorter_snapshot_drops_cursor() {
        let mut session = session_with(vec![seed("OK", 1), seed("OK", 1)]);
        session.next_seed();
        session.apply_persisted(vec![seed("OK", 1)]);
        assert_eq!(session.cursor(), None);
    }
}
