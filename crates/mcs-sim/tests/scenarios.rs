//! End-to-end scenario suite (spec §8 S1-S6), each run against a fresh
//! in-process [`mcs_sim::Topology`].

use mcs_sim::{build, scenario_s1, scenario_s2, scenario_s3, scenario_s4, scenario_s5, scenario_s6};

#[tokio::test(start_paused = true)]
async fn s1_happy_path_scan() {
    let topo = build();
    scenario_s1(&topo).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn s2_receptor_conflict() {
    let topo = build();
    scenario_s2(&topo).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn s3_mid_scan_abort() {
    let topo = build();
    scenario_s3(&topo).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn s4_configure_timeout_faults_subarray() {
    let topo = build();
    scenario_s4(&topo).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn s5_partial_power_on() {
    let topo = build();
    scenario_s5(&topo).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn s6_lru_fault_detection() {
    let topo = build();
    scenario_s6(&topo).await.unwrap();
}
