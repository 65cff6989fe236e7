//! Viterbi decoding fixtures and linear/log agreement.

use approx::assert_relative_eq;
use hexcontrol_hmm::{viterbi, viterbi_log, EncoderParams, HmmModel, Symbol};
use ndarray::{array, Array1, Array2};
use proptest::prelude::*;

fn domain_transition() -> Array2<f64> {
    array![
        [0.250, 0.500, 0.025, 0.200, 0.025],
        [0.250, 0.150, 0.075, 0.500, 0.025],
        [0.050, 0.025, 0.050, 0.850, 0.025],
        [0.025, 0.075, 0.150, 0.125, 0.625],
        [0.050, 0.075, 0.475, 0.025, 0.375],
    ]
}

#[test]
fn identity_transitions_keep_best_initial_state() {
    let model = HmmModel::territorial(&[0.2; 5]).unwrap();
    let pi = Array1::from_elem(5, 0.2);
    let t = Array2::<f64>::eye(5);
    let obs = [0, 0, 1, 0, 0, 3];

    let linear = viterbi(pi.view(), t.view(), model.emission().view(), &obs).unwrap();
    let log = viterbi_log(pi.view(), t.view(), model.emission().view(), &obs).unwrap();
    assert_eq!(linear.path, vec![0; 6]);
    assert_eq!(log.path, vec![0; 6]);
}

#[test]
fn exclusive_symbol_forces_its_state() {
    let pi = Array1::from_elem(5, 0.2);
    let e = array![
        [0.25, 0.25, 0.25, 0.0],
        [0.25, 0.25, 0.25, 0.0],
        [0.25, 0.25, 0.25, 0.0],
        [0.25, 0.25, 0.25, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ];
    let obs = [3; 6];

    let linear = viterbi(pi.view(), domain_transition().view(), e.view(), &obs).unwrap();
    assert_eq!(linear.path, vec![4; 6]);
    assert!(linear.trellis.row(0).iter().all(|&v| v == 0.0));

    let log = viterbi_log(pi.view(), domain_transition().view(), e.view(), &obs).unwrap();
    assert_eq!(log.path, vec![4; 6]);
}

#[test]
fn territorial_model_decodes_full_length() {
    let model = HmmModel::territorial(&[0.025, 0.025, 0.025, 0.025, 0.9]).unwrap();
    let obs: Vec<usize> = (0..48).map(|i| (i * 7 + i / 5) % 4).collect();
    let out = viterbi_log(model.initial().view(), model.transition().view(), model.emission().view(), &obs).unwrap();
    assert_eq!(out.path.len(), obs.len());
    assert_eq!(out.trellis.dim(), (5, 48));
    assert!(out.path.iter().all(|&s| s < 5));
}

/// Every sequence over `alphabet` symbols of length `1..=max_len`.
fn all_sequences(alphabet: usize, max_len: u32) -> impl Iterator<Item = Vec<usize>> {
    (1..=max_len).flat_map(move |len| {
        (0..alphabet.pow(len)).map(move |mut code| {
            (0..len)
                .map(|_| {
                    let symbol = code % alphabet;
                    code /= alphabet;
                    symbol
                })
                .collect()
        })
    })
}

#[test]
fn identity_transitions_agree_on_every_short_sequence() {
    let model = HmmModel::territorial(&[0.2; 5]).unwrap();
    let pi = Array1::from_elem(5, 0.2);
    let t = Array2::<f64>::eye(5);
    let e = model.emission();

    let mut decoded = 0;
    for obs in all_sequences(4, 7) {
        let linear = viterbi(pi.view(), t.view(), e.view(), &obs).unwrap();
        let log = viterbi_log(pi.view(), t.view(), e.view(), &obs).unwrap();
        assert_eq!(linear.path, log.path, "observations {obs:?}");
        decoded += 1;
    }
    assert_eq!(decoded, 21_844);

    // states 0 and 4 emit [1, 3, 0] with the same probability
    let tied = viterbi(pi.view(), t.view(), e.view(), &[1, 3, 0]).unwrap();
    assert_eq!(tied.path, vec![0, 0, 0]);
}

#[test]
fn territorial_model_agrees_on_every_short_sequence() {
    let model = HmmModel::territorial(&[0.2; 5]).unwrap();
    for obs in all_sequences(4, 7) {
        let linear = viterbi(model.initial().view(), model.transition().view(), model.emission().view(), &obs).unwrap();
        let log = viterbi_log(model.initial().view(), model.transition().view(), model.emission().view(), &obs).unwrap();
        assert_eq!(linear.path, log.path, "observations {obs:?}");
    }
}

/// Joint probability of `path` emitting `obs`.
fn path_probability(pi: &Array1<f64>, t: &Array2<f64>, e: &Array2<f64>, path: &[usize], obs: &[usize]) -> f64 {
    let mut p = pi[path[0]] * e[[path[0], obs[0]]];
    for k in 1..path.len() {
        p *= t[[path[k - 1], path[k]]] * e[[path[k], obs[k]]];
    }
    p
}

fn normalized_rows(values: Vec<f64>, cols: usize) -> Array2<f64> {
    let mut m = Array2::from_shape_vec((values.len() / cols, cols), values).unwrap();
    for mut row in m.rows_mut() {
        let sum = row.sum();
        row /= sum;
    }
    m
}

fn random_problem() -> impl Strategy<Value = (Array1<f64>, Array2<f64>, Array2<f64>, Vec<usize>)> {
    (1usize..6, 1usize..5, 1usize..12).prop_flat_map(|(n, k, l)| {
        (
            prop::collection::vec(0.05f64..1.0, n),
            prop::collection::vec(0.05f64..1.0, n * n),
            prop::collection::vec(0.05f64..1.0, n * k),
            prop::collection::vec(0..k, l),
        )
            .prop_map(move |(pi, t, e, obs)| {
                let total: f64 = pi.iter().sum();
                let pi = Array1::from(pi) / total;
                (pi, normalized_rows(t, n), normalized_rows(e, k), obs)
            })
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn linear_and_log_decode_the_same_path((pi, t, e, obs) in random_problem()) {
        let linear = viterbi(pi.view(), t.view(), e.view(), &obs).unwrap();
        let log = viterbi_log(pi.view(), t.view(), e.view(), &obs).unwrap();
        prop_assert_eq!(linear.path.len(), obs.len());
        prop_assert_eq!(&linear.path, &log.path);

        let p_linear = path_probability(&pi, &t, &e, &linear.path, &obs);
        let best = linear.trellis.column(obs.len() - 1).fold(0.0f64, |a, &b| a.max(b));
        assert_relative_eq!(best, p_linear, max_relative = 1e-9);
    }

    #[test]
    fn quiet_exactly_when_both_exposures_truncate(
        t in 0.0f64..0.05,
        c in 0.0f64..0.05,
        ts in 0.0f64..1.0,
        cs in 0.0f64..1.0,
    ) {
        let params = EncoderParams::default();
        let symbol = params.classify(t, c, ts, cs);
        let both_truncated = t < params.truncation && c < params.truncation;
        prop_assert_eq!(symbol == Symbol::Quiet, both_truncated);
        prop_assert!(symbol.index() < 4);
    }
}
