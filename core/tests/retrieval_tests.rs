use tutor_core::{load, persist, rank, CorpusRecord, FitOptions, Index, RetrievalError, TfMode};

fn courses() -> Vec<CorpusRecord> {
    [
        ("1", "Contract law basics: offer, acceptance and consideration."),
        ("2", "Cell biology intro: membranes, organelles and the cell cycle."),
        ("3", "Introductory microeconomics: supply, demand and market equilibrium."),
        ("4", "Organic chemistry I: carbon compounds and reaction mechanisms."),
        ("5", "Criminal law: elements of crimes, defenses and procedure."),
        ("6", "Linear algebra: vectors, matrices and eigenvalues."),
        ("7", "Genetics: inheritance, DNA replication and gene expression in the cell."),
        ("8", "Macroeconomics: inflation, unemployment and monetary policy."),
        ("9", "Calculus I: limits, derivatives and integrals."),
        ("10", "Constitutional law and the separation of powers."),
    ]
    .into_iter()
    .map(|(id, d)| CorpusRecord::new(id, d))
    .collect()
}

fn fit(records: Vec<CorpusRecord>) -> Index {
    Index::fit(records, FitOptions::default()).unwrap()
}

#[test]
fn contract_law_scenario() {
    let index = fit(vec![
        CorpusRecord::new("1", "contract law basics"),
        CorpusRecord::new("2", "cell biology intro"),
    ]);
    let top = rank(&index, "law contract", 1).unwrap();
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].id, "1");
    assert!(top[0].score > 0.0);
}

#[test]
fn self_query_ranks_first_with_unit_score() {
    for mode in [TfMode::Raw, TfMode::Sublinear] {
        let records = courses();
        let index = Index::fit(records.clone(), FitOptions { tf_mode: mode }).unwrap();
        for r in &records {
            let top = rank(&index, &r.description, 3).unwrap();
            assert_eq!(top[0].id, r.id, "{mode:?}");
            assert!((top[0].score - 1.0).abs() < 1e-5, "{} scored {}", r.id, top[0].score);
        }
    }
}

#[test]
fn unknown_terms_score_zero_but_still_return_k() {
    let index = fit(courses());
    let top = rank(&index, "quantum chromodynamics", 4).unwrap();
    assert_eq!(top.len(), 4);
    assert!(top.iter().all(|m| m.score == 0.0 && m.score.is_sign_positive()));
    // all tied, so corpus order
    let ids: Vec<&str> = top.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2", "3", "4"]);

    let empty = rank(&index, "", 20).unwrap();
    assert_eq!(empty.len(), 10);
    assert!(empty.iter().all(|m| m.score == 0.0 && m.score.is_sign_positive()));
}

#[test]
fn k_larger_than_corpus_returns_every_record() {
    let index = fit(courses());
    assert_eq!(rank(&index, "law", 50).unwrap().len(), 10);
}

#[test]
fn zero_k_is_invalid() {
    let index = fit(courses());
    assert!(matches!(rank(&index, "law", 0), Err(RetrievalError::InvalidK(0))));
}

#[test]
fn scores_are_sorted_and_ties_keep_corpus_order() {
    let index = fit(vec![
        CorpusRecord::new("a", "history"),
        CorpusRecord::new("b", "law school"),
        CorpusRecord::new("c", "law school"),
        CorpusRecord::new("d", "law"),
    ]);
    let top = rank(&index, "law", 4).unwrap();
    let ids: Vec<&str> = top.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["d", "b", "c", "a"]);
    assert_eq!(top[1].score, top[2].score);
    assert!(top.windows(2).all(|w| w[0].score >= w[1].score));
}

#[test]
fn rank_is_deterministic() {
    let index = fit(courses());
    for q in ["law", "cell genetics", "economics policy", "nothing here"] {
        assert_eq!(rank(&index, q, 5).unwrap(), rank(&index, q, 5).unwrap());
    }
}

#[test]
fn record_without_terms_never_matches() {
    let mut records = courses();
    records.insert(0, CorpusRecord::new("blank", "  -- "));
    let index = fit(records);
    let top = rank(&index, "law", 11).unwrap();
    let blank = top.iter().find(|m| m.id == "blank").unwrap();
    assert_eq!(blank.score, 0.0);
    assert_ne!(top[0].id, "blank");
}

#[test]
fn round_trip_preserves_rankings() {
    let index = fit(courses());
    let loaded = load(&persist(&index).unwrap()).unwrap();
    for q in ["law", "the cell", "derivatives and integrals", "unrelated words", ""] {
        assert_eq!(rank(&index, q, 10).unwrap(), rank(&loaded, q, 10).unwrap());
    }
}

#[test]
fn fitting_twice_is_bit_identical() {
    let a = fit(courses());
    let b = fit(courses());
    let bits = |i: &Index| -> (Vec<u32>, Vec<u32>) {
        let w = i.weights().iter().map(|x| x.to_bits()).collect();
        let v = i.entries().flat_map(|(_, v)| v.iter().map(|x| x.to_bits()).collect::<Vec<_>>()).collect();
        (w, v)
    };
    assert_eq!(a.vocabulary().terms(), b.vocabulary().terms());
    assert_eq!(bits(&a), bits(&b));
    assert_eq!(persist(&a).unwrap(), persist(&b).unwrap());
}

#[test]
fn concurrent_queries_share_one_index() {
    let index = std::sync::Arc::new(fit(courses()));
    let expected = rank(&index, "law", 3).unwrap();
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let index = index.clone();
            std::thread::spawn(move || rank(&index, "law", 3).unwrap())
        })
        .collect();
    for h in handles {
        assert_eq!(h.join().unwrap(), expected);
    }
}
