//! BDD step definitions for the pulse builder and lifecycle

use std::sync::Arc;
use std::time::Duration;

use cucumber::{given, then, when};
use tokio_util::sync::CancellationToken;

use pulse::log_store::LogSink;
use pulse::notifier::Notifier;
use pulse::probe::Prober;
use pulse::{Config, PulseBuilder};

use crate::doubles::run_paused;
use crate::world::PulseWorld;

fn lifecycle_config(world: &PulseWorld) -> Config {
    let mut config = Config {
        endpoints: world.endpoints.clone(),
        ..Config::default()
    };
    config.status.enabled = false;
    config
}

fn builder(world: &PulseWorld) -> PulseBuilder {
    let notifiers: Vec<Arc<dyn Notifier>> = vec![Arc::clone(&world.notifier) as Arc<dyn Notifier>];
    PulseBuilder::new(lifecycle_config(world))
        .with_prober(Arc::clone(&world.prober) as Arc<dyn Prober>)
        .with_log_sink(Arc::clone(&world.log_sink) as Arc<dyn LogSink>)
        .with_notifiers(notifiers)
}

#[given(expr = "probes of {string} fail {int} times then succeed")]
fn probes_fail_then_succeed(world: &mut PulseWorld, name: String, failures: usize) {
    let mut behaviour = world.behaviours.remove(&name).unwrap_or_default();
    behaviour.outcomes = vec![false; failures];
    behaviour.outcomes.push(true);
    world.prober.set(&name, behaviour.clone());
    world.behaviours.insert(name, behaviour);
}

#[when(expr = "pulse runs for {int} seconds")]
fn pulse_runs(world: &mut PulseWorld, seconds: u64) {
    let builder = builder(world);

    let (completed, state) = run_paused(move || async move {
        let cancel = CancellationToken::new();
        let pulse = builder
            .with_cancellation_token(cancel.clone())
            .build()
            .await
            .expect("build failed");
        let state = pulse.state();
        let run = tokio::spawn(pulse.start());

        tokio::time::sleep(Duration::from_secs(seconds)).await;
        cancel.cancel();
        let completed = matches!(run.await, Ok(Ok(())));
        (completed, state)
    });

    world.lifecycle_completed = Some(completed);
    world.state = Some(state);
}

#[when("pulse is built")]
fn pulse_built(world: &mut PulseWorld) {
    let builder = builder(world);
    let result = run_paused(move || async move { builder.build().await.map(|_| ()) });
    world.build_error = result.err().map(|e| e.to_string());
}

#[when("pulse is built without a log store")]
fn pulse_built_without_log_store(world: &mut PulseWorld) {
    let notifiers: Vec<Arc<dyn Notifier>> = vec![Arc::clone(&world.notifier) as Arc<dyn Notifier>];
    let builder = PulseBuilder::new(lifecycle_config(world))
        .with_prober(Arc::clone(&world.prober) as Arc<dyn Prober>)
        .with_notifiers(notifiers);
    let result = run_paused(move || async move { builder.build().await.map(|_| ()) });
    world.build_error = result.err().map(|e| e.to_string());
}

#[then("pulse stopped cleanly")]
fn stopped_cleanly(world: &mut PulseWorld) {
    assert_eq!(world.lifecycle_completed, Some(true));
}

#[then(expr = "the log store received {int} results for {string}")]
fn log_store_received(world: &mut PulseWorld, count: usize, name: String) {
    assert_eq!(world.log_sink.count_for(&name), count);
}

#[then(expr = "the notifier received {string} for {string}")]
fn notifier_received(world: &mut PulseWorld, kinds: String, name: String) {
    let expected: Vec<String> = kinds
        .split(',')
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect();
    assert_eq!(world.notifier.kinds_for(&name), expected);
}

#[then(expr = "the alert history has {int} entries")]
async fn alert_history(world: &mut PulseWorld, count: usize) {
    let state = world.state.as_ref().expect("pulse has not run");
    assert_eq!(state.read().await.history.len(), count);
}

#[then(expr = "the build fails mentioning {string}")]
fn build_fails(world: &mut PulseWorld, text: String) {
    let error = world.build_error.as_deref().expect("build succeeded");
    assert!(error.contains(&text), "expected '{}' in '{}'", text, error);
}
