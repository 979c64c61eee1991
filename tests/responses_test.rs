//! Integration tests for the cached response and current drivers

mod common;

use common::{
    assert_close, flash_config, shuffled_connectome, Backend, ToyFlashes, ToyView, DT,
};
use flyvis::analysis::{generic_currents, generic_responses, CellIndex};
use flyvis::cache::Memory;
use flyvis::network::ResponseOptions;
use flyvis::table::Column;
use flyvis::Error;
use ndarray::{s, IxDyn};
use serde_json::json;
use std::sync::Arc;

fn responses(views: &[&ToyView], options: &ResponseOptions) -> flyvis::labeled::LabeledSet {
    generic_responses::<Backend, ToyView, ToyFlashes>(
        views,
        &flash_config(),
        options,
        &CellIndex::Central,
    )
    .unwrap()
}

#[test]
fn test_time_coordinate_and_central_cells() {
    let memory = Arc::new(Memory::in_memory());
    let view = ToyView::new("0000", Some(0.1), 1.0, &memory);
    let set = responses(&[&view], &ResponseOptions::new());

    let Column::Float(time) = set.coord("time").unwrap() else {
        panic!("time is a float coordinate");
    };
    let expected = [-1.0, -0.99, -0.98, -0.97, -0.96];
    assert_eq!(time.len(), expected.len());
    for (t, e) in time.iter().zip(expected) {
        assert!((t - e).abs() < 1e-9, "{:?}", time);
    }

    let resp = set.var("responses").unwrap();
    assert_eq!(resp.dims, vec!["network_id", "sample", "frame", "neuron"]);
    assert_eq!(resp.shape(), &[1, 3, 5, 4]);
    assert_eq!(
        set.coord("cell_type").unwrap(),
        &Column::Str(vec!["R1".into(), "L1".into(), "Mi1".into(), "T4".into()])
    );
    assert_eq!(set.coord("u_in").unwrap(), &Column::Int(vec![1, 0]));
    assert_eq!(
        set.coord("checkpoints").unwrap(),
        &Column::Str(vec!["0000:best".into()])
    );

    // tau equals dt, so the input cells follow the stimulus exactly
    for sample in 0..3 {
        let r1: Vec<f32> = resp.data.slice(s![0, sample, .., 0]).iter().copied().collect();
        assert_close(&r1, &[ToyFlashes::intensity(sample); 5]);
        let l1: Vec<f32> = resp.data.slice(s![0, sample, .., 1]).iter().copied().collect();
        assert_close(&l1, &[0.0; 5]);
    }

    let stimulus = set.var("stimulus").unwrap();
    assert_eq!(stimulus.shape(), &[3, 5, 1, 2]);
    assert_eq!(
        set.coord("intensity").unwrap(),
        &Column::Float(
            (0..3)
                .map(|i| ToyFlashes::intensity(i) as f64)
                .collect()
        )
    );
    assert_eq!(set.attr("network_config").unwrap()["gain"], json!(1.0));
}

#[test]
fn test_second_call_is_served_from_cache() {
    let memory = Arc::new(Memory::in_memory());
    let view = ToyView::new("0000", Some(0.1), 1.0, &memory);
    let options = ResponseOptions::new();

    let first = responses(&[&view], &options);
    assert_eq!(view.steps(), 5);
    assert_eq!(view.inits(), 1);

    let second = responses(&[&view], &options);
    assert_eq!(view.steps(), 5);
    assert_eq!(view.inits(), 1);
    assert_eq!(first, second);

    // performance knobs do not change the key
    let mut config = flash_config();
    config.insert("batch_size".into(), json!(64));
    generic_responses::<Backend, ToyView, ToyFlashes>(&[&view], &config, &options, &CellIndex::Central)
        .unwrap();
    assert_eq!(view.steps(), 5);

    // timing does
    responses(&[&view], &options.clone().with_t_pre(2.0 * DT));
    assert_eq!(view.steps(), 5 + 2 + 5);
}

#[test]
fn test_disk_cache_survives_memory() {
    let dir = tempfile::tempdir().unwrap();
    let view = ToyView::new("0000", Some(0.1), 1.0, &Arc::new(Memory::on_disk(dir.path())));
    let first = responses(&[&view], &ResponseOptions::new());

    let fresh = ToyView::new("0000", Some(0.1), 1.0, &Arc::new(Memory::on_disk(dir.path())));
    let second = responses(&[&fresh], &ResponseOptions::new());
    assert_eq!(fresh.steps(), 0);
    assert_eq!(fresh.inits(), 0);
    assert_eq!(first, second);
}

#[test]
fn test_ensemble_responses_reuse_one_network() {
    let memory = Arc::new(Memory::in_memory());
    let a = ToyView::new("0000", Some(0.1), 1.0, &memory);
    let b = ToyView::new("0001", Some(0.2), 2.0, &memory).sharing_counters(&a);

    let set = responses(&[&a, &b], &ResponseOptions::new());
    assert_eq!(a.inits(), 1);
    assert_eq!(a.steps(), 10);

    let resp = set.var("responses").unwrap();
    assert_eq!(resp.shape(), &[2, 3, 5, 4]);
    assert!((resp.data[IxDyn(&[0, 2, 4, 0])] - ToyFlashes::intensity(2)).abs() < 1e-5);
    assert!((resp.data[IxDyn(&[1, 2, 4, 0])] - 2.0 * ToyFlashes::intensity(2)).abs() < 1e-5);
    assert_eq!(
        set.coord("checkpoints").unwrap(),
        &Column::Str(vec!["0000:best".into(), "0001:best".into()])
    );

    // a hit for the first handle does not allocate a network
    let c = ToyView::new("0002", Some(0.3), 3.0, &memory).sharing_counters(&a);
    responses(&[&a, &c], &ResponseOptions::new());
    assert_eq!(a.inits(), 2);
    assert_eq!(a.steps(), 15);
}

#[test]
fn test_explicit_cell_selection() {
    let memory = Arc::new(Memory::in_memory());
    let view = ToyView::new("0000", Some(0.1), 1.0, &memory);
    let options = ResponseOptions::new();

    let set = generic_responses::<Backend, ToyView, ToyFlashes>(
        &[&view],
        &flash_config(),
        &options,
        &CellIndex::Indices(vec![0, 3]),
    )
    .unwrap();
    assert_eq!(
        set.coord("cell_type").unwrap(),
        &Column::Str(vec!["R1".into(), "L1".into()])
    );
    assert_eq!(set.coord("u").unwrap(), &Column::Int(vec![1, 1]));

    let all = generic_responses::<Backend, ToyView, ToyFlashes>(
        &[&view],
        &flash_config(),
        &options,
        &CellIndex::All,
    )
    .unwrap();
    assert_eq!(all.dim_size("neuron"), Some(6));

    let err = generic_responses::<Backend, ToyView, ToyFlashes>(
        &[&view],
        &flash_config(),
        &options,
        &CellIndex::Indices(vec![6]),
    );
    assert!(matches!(err, Err(Error::ShapeMismatch(_))));
}

#[test]
fn test_mismatched_connectomes_are_rejected() {
    let memory = Arc::new(Memory::in_memory());
    let a = ToyView::new("0000", Some(0.1), 1.0, &memory);
    let b = ToyView::new("0001", Some(0.2), 1.0, &memory).with_connectome(shuffled_connectome());

    let err = generic_responses::<Backend, ToyView, ToyFlashes>(
        &[&a, &b],
        &flash_config(),
        &ResponseOptions::new(),
        &CellIndex::Central,
    );
    assert!(matches!(err, Err(Error::ConnectomeMismatch(_))));
    assert_eq!(a.steps(), 0);

    let none: [&ToyView; 0] = [];
    let err = generic_responses::<Backend, ToyView, ToyFlashes>(
        &none,
        &flash_config(),
        &ResponseOptions::new(),
        &CellIndex::Central,
    );
    assert!(matches!(err, Err(Error::EmptyEnsemble)));
}

#[test]
fn test_currents_per_target_type() {
    let memory = Arc::new(Memory::in_memory());
    let view = ToyView::new("0000", Some(0.1), 1.0, &memory);
    let options = ResponseOptions::new();

    let mut config = flash_config();
    config.insert("type".into(), json!("ToyFlashes"));
    let data = generic_currents::<Backend, ToyView, ToyFlashes>(&[&view], &config, &options)
        .unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(view.steps(), 15);

    let experiment = &data[0];
    assert!(experiment.dataset_config().unwrap().get("type").is_none());
    let targets: Vec<&str> = experiment.target_data.iter().map(|(t, _)| t.as_str()).collect();
    assert_eq!(targets, vec!["L1", "Mi1", "T4"]);

    // L1 at the origin receives from both photoreceptors
    let l1 = experiment.target("L1").unwrap();
    assert_eq!(l1.activity_central.len(), 3);
    assert_close(&l1.activity_central[0], &[0.0; 5]);
    let r1 = l1.source("R1").unwrap();
    assert_eq!(r1.len(), 3);
    assert_eq!(r1[1].shape(), &[5, 2]);
    assert!((r1[1][[4, 0]] - ToyFlashes::intensity(1)).abs() < 1e-5);

    let t4 = experiment.target("T4").unwrap();
    let sources: Vec<&str> = t4.source_data.iter().map(|(s, _)| s.as_str()).collect();
    assert_eq!(sources, vec!["Mi1", "R1"]);

    let again = generic_currents::<Backend, ToyView, ToyFlashes>(&[&view], &config, &options)
        .unwrap();
    assert_eq!(view.steps(), 15);
    assert_eq!(again, data);

    // performance knobs do not change the key
    config.insert("batch_size".into(), json!(64));
    config.insert("num_workers".into(), json!(4));
    let batched = generic_currents::<Backend, ToyView, ToyFlashes>(&[&view], &config, &options)
        .unwrap();
    assert_eq!(view.steps(), 15);
    assert_eq!(batched, data);
}
