//! Property tests: arbitrary interleavings of commands, engine events and
//! focus changes

mod helpers;

use proptest::prelude::*;

use helpers::*;
use radio_core::focus::FocusChange;
use radio_core::store::PlaybackStore;
use radio_core::{EngineEvent, PlaybackState};

#[derive(Debug, Clone)]
enum Op {
    Play,
    Pause,
    Stop,
    Buffering,
    Started,
    EngineStopped,
    TransportError,
    FocusGained,
    FocusLostTransiently(bool),
    FocusLostPermanently,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Play),
        2 => Just(Op::Pause),
        1 => Just(Op::Stop),
        1 => Just(Op::Buffering),
        3 => Just(Op::Started),
        1 => Just(Op::EngineStopped),
        1 => Just(Op::TransportError),
        2 => Just(Op::FocusGained),
        2 => any::<bool>().prop_map(Op::FocusLostTransiently),
        1 => Just(Op::FocusLostPermanently),
    ]
}

fn apply(h: &Harness, op: &Op) {
    let handle = h.player.handle();
    let focus = handle.focus_callback();
    match op {
        Op::Play => handle.play().unwrap(),
        Op::Pause => handle.pause().unwrap(),
        Op::Stop => handle.stop().unwrap(),
        Op::Buffering => h.engine.emit(EngineEvent::Buffering),
        Op::Started => h.engine.emit(EngineEvent::Started),
        Op::EngineStopped => h.engine.emit(EngineEvent::Stopped),
        Op::TransportError => h.engine.emit(EngineEvent::TransportError("injected".into())),
        Op::FocusGained => focus.on_focus_change(FocusChange::Gained),
        Op::FocusLostTransiently(duckable) => {
            focus.on_focus_change(FocusChange::LostTransiently { duckable: *duckable })
        }
        Op::FocusLostPermanently => focus.on_focus_change(FocusChange::LostPermanently),
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .start_paused(true)
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_any_sequence_ends_in_a_defined_state(ops in prop::collection::vec(op(), 0..40)) {
        runtime().block_on(async {
            let mut h = HarnessBuilder::new().spawn();

            for op in &ops {
                apply(&h, op);
                settle().await;
            }

            let published = drain_states(&mut h.events);
            let state = h.player.handle().state();
            assert!(matches!(
                state,
                PlaybackState::Stopped
                    | PlaybackState::Loading
                    | PlaybackState::Playing
                    | PlaybackState::Paused
            ));
            if let Some(last) = published.last() {
                assert_eq!(*last, state);
            }

            // Playing is only ever reached from Loading
            let mut previous = PlaybackState::Stopped;
            for next in published {
                if next == PlaybackState::Playing && previous != PlaybackState::Playing {
                    assert_eq!(previous, PlaybackState::Loading);
                }
                previous = next;
            }

            // Engine output is only live while a session is in flight
            if state == PlaybackState::Stopped {
                assert_eq!(h.engine.current_session(), None);
            }
        });
    }

    #[test]
    fn prop_stop_always_yields_stopped_and_clean(ops in prop::collection::vec(op(), 0..40)) {
        runtime().block_on(async {
            let mut h = HarnessBuilder::new().spawn();

            for op in &ops {
                apply(&h, op);
            }
            settle().await;
            drain_states(&mut h.events);

            h.player.handle().stop().unwrap();
            assert_eq!(next_state(&mut h.events).await, PlaybackState::Stopped);
            assert_eq!(h.player.handle().state(), PlaybackState::Stopped);
            assert!(h.store.load().clean_shutdown);
            assert_eq!(h.engine.current_session(), None);
        });
    }
}
