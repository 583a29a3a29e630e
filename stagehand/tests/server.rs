//! End-to-end tests driving the server exclusively through its public
//! surface: the command queue, the message queue, and `run_once`.

use std::sync::Arc;

use stagehand::server::{
    ArtboardHandle, CommandServer, Event, FileHandle, InstanceHandle, MachineHandle, Op,
    RequestId, ResourceKind, RunOnceError, ServerError, ServerOptions, Sprite, StartupError,
    TargetHandle,
};
use stagehand::{render, DrawRequest, Driver};
use stagehand_core::scene::{
    AnimationDescriptor, ArtboardDescriptor, BindingDescriptor, BindingSource,
    DocumentDescriptor, InputDescriptor, LayerDescriptor, LoopMode, PropertyDescriptor,
    StateMachineDescriptor, ViewModelDescriptor,
};
use stagehand_core::scene::DefaultValue;
use stagehand_core::value::{Color, PropertyType, PropertyValue};

fn server() -> CommandServer {
    let _ = env_logger::builder().is_test(true).try_init();
    CommandServer::new().unwrap()
}

/// Queue barrier: once this returns, every previously enqueued command has
/// executed and its messages are drainable.
fn barrier(server: &CommandServer) {
    server.run_once(|_| ()).unwrap();
}

/// Submit one request and pull out its reply, discarding everything else.
fn call(server: &CommandServer, rid: RequestId, op: Op) -> Event {
    server.submit(rid, op);
    barrier(server);
    server
        .drain()
        .into_iter()
        .find_map(|m| (m.request_id == rid).then_some(m.event))
        .expect("no reply for request")
}

/// One artboard with two machines and an animation, plus two view models.
fn demo_document() -> Box<[u8]> {
    let document = DocumentDescriptor {
        artboards: vec![ArtboardDescriptor {
            name: "main".into(),
            width: 100.0,
            height: 50.0,
            background: Color::WHITE,
            machines: vec![
                StateMachineDescriptor {
                    name: "idle".into(),
                    inputs: vec![
                        InputDescriptor::Number {
                            name: "speed".into(),
                            default: 1.0,
                        },
                        InputDescriptor::Trigger { name: "jump".into() },
                    ],
                    layers: Vec::new(),
                    bindings: Vec::new(),
                },
                StateMachineDescriptor {
                    name: "timed".into(),
                    inputs: Vec::new(),
                    layers: vec![LayerDescriptor {
                        name: "base".into(),
                        duration: 10.0,
                    }],
                    bindings: vec![BindingDescriptor {
                        path: "time".into(),
                        source: BindingSource::ElapsedSeconds,
                    }],
                },
            ],
            animations: vec![AnimationDescriptor {
                name: "intro".into(),
                duration: 1.0,
                loop_mode: LoopMode::OneShot,
            }],
        }],
        view_models: vec![
            ViewModelDescriptor {
                name: "hud".into(),
                properties: vec![
                    PropertyDescriptor {
                        name: "time".into(),
                        default: DefaultValue::Number(0.0),
                    },
                    PropertyDescriptor {
                        name: "gear".into(),
                        default: DefaultValue::Instance("item".into()),
                    },
                    PropertyDescriptor {
                        name: "inventory".into(),
                        default: DefaultValue::List("item".into()),
                    },
                ],
            },
            ViewModelDescriptor {
                name: "item".into(),
                properties: vec![PropertyDescriptor {
                    name: "label".into(),
                    default: DefaultValue::String("sword".into()),
                }],
            },
        ],
        referenced_assets: Vec::new(),
    };
    document.to_bytes().unwrap().into_boxed_slice()
}

struct Stage {
    server: CommandServer,
    file: FileHandle,
    artboard: ArtboardHandle,
}
fn stage() -> Stage {
    let server = server();
    let Event::FileLoaded(file) = call(&server, 1, Op::LoadFile { bytes: demo_document() })
    else {
        panic!("load failed");
    };
    let Event::ArtboardCreated(artboard) =
        call(&server, 2, Op::CreateDefaultArtboard { file })
    else {
        panic!("artboard creation failed");
    };
    Stage { server, file, artboard }
}
impl Stage {
    fn machine(&self, name: &str) -> MachineHandle {
        match call(
            &self.server,
            90,
            Op::CreateStateMachineByName {
                artboard: self.artboard,
                name: name.to_owned(),
            },
        ) {
            Event::MachineCreated(machine) => machine,
            other => panic!("machine creation failed: {other:?}"),
        }
    }
    fn instance(&self, view_model: Option<&str>) -> InstanceHandle {
        match call(
            &self.server,
            91,
            Op::CreateViewModelInstance {
                file: self.file,
                view_model: view_model.map(str::to_owned),
            },
        ) {
            Event::InstanceCreated(instance) => instance,
            other => panic!("instance creation failed: {other:?}"),
        }
    }
    fn target(&self, width: u32, height: u32) -> TargetHandle {
        match call(
            &self.server,
            92,
            Op::CreateRenderTarget { width, height, samples: 1 },
        ) {
            Event::TargetCreated(target) => target,
            other => panic!("target creation failed: {other:?}"),
        }
    }
}

fn rgba(pixels: &[u8], width: u32, x: u32, y: u32) -> [u8; 4] {
    let at = ((y * width + x) * 4) as usize;
    pixels[at..at + 4].try_into().unwrap()
}

#[test]
fn handles_are_unique_across_kinds() {
    let stage = stage();
    let machine = stage.machine("idle");
    let instance = stage.instance(None);
    let target = stage.target(4, 4);

    let mut raw = vec![
        stage.file.raw(),
        stage.artboard.raw(),
        machine.raw(),
        instance.raw(),
        target.raw(),
    ];
    raw.sort_unstable();
    raw.dedup();
    assert_eq!(raw.len(), 5);
}

#[test]
fn replies_arrive_in_submission_order() {
    let server = server();
    server.submit(1, Op::LoadFile { bytes: demo_document() });
    server.submit(2, Op::LoadFile { bytes: demo_document() });
    server.submit(3, Op::LoadFile { bytes: Box::new([]) });
    server.submit(4, Op::CreateRenderTarget { width: 2, height: 2, samples: 1 });
    barrier(&server);

    let order: Vec<_> = server
        .drain()
        .iter()
        .map(|m| m.request_id)
        .filter(|&rid| rid != 0)
        .collect();
    assert_eq!(order, [1, 2, 3, 4]);
}

#[test]
fn bad_documents_fail_without_side_effects() {
    let server = server();
    assert!(matches!(
        call(&server, 1, Op::LoadFile { bytes: Box::new([]) }),
        Event::Error(ServerError::Import(_))
    ));

    // A document with zero artboards loads fine; instantiating its default
    // artboard is what fails.
    let empty = DocumentDescriptor::default().to_bytes().unwrap();
    let Event::FileLoaded(file) =
        call(&server, 2, Op::LoadFile { bytes: empty.into_boxed_slice() })
    else {
        panic!("load failed");
    };
    assert!(matches!(
        call(&server, 3, Op::CreateDefaultArtboard { file }),
        Event::Error(ServerError::NotFound { kind: ResourceKind::Artboard, .. })
    ));
}

#[test]
fn unknown_inputs_are_silently_ignored() {
    let stage = stage();
    let machine = stage.machine("idle");
    stage.server.submit(0, Op::FireTriggerInput {
        machine,
        name: "missing".into(),
    });
    // Wrong type for an existing name is a miss too.
    stage.server.submit(0, Op::SetBooleanInput {
        machine,
        name: "speed".into(),
        value: true,
    });
    stage.server.submit(0, Op::AdvanceStateMachine {
        machine,
        delta_seconds: 0.016,
    });
    barrier(&stage.server);

    let messages = stage.server.drain();
    assert!(!messages
        .iter()
        .any(|m| matches!(m.event, Event::Error(_))));
    // The advance still went through and settled the idle machine.
    assert!(messages
        .iter()
        .any(|m| m.event == Event::Settled(machine)));
}

#[test]
fn settle_is_reported_exactly_once_per_quiet_period() {
    let stage = stage();
    let machine = stage.machine("idle");
    for _ in 0..3 {
        stage.server.submit(0, Op::AdvanceStateMachine {
            machine,
            delta_seconds: 0.016,
        });
    }
    barrier(&stage.server);
    let settles = stage
        .server
        .drain()
        .iter()
        .filter(|m| m.event == Event::Settled(machine))
        .count();
    assert_eq!(settles, 1);

    // New input wakes the machine: exactly one more settle.
    stage.server.submit(0, Op::FireTriggerInput {
        machine,
        name: "jump".into(),
    });
    for _ in 0..3 {
        stage.server.submit(0, Op::AdvanceStateMachine {
            machine,
            delta_seconds: 0.016,
        });
    }
    barrier(&stage.server);
    let settles = stage
        .server
        .drain()
        .iter()
        .filter(|m| m.event == Event::Settled(machine))
        .count();
    assert_eq!(settles, 1);
}

#[test]
fn mid_transition_advances_stay_quiet() {
    let stage = stage();
    let machine = stage.machine("timed");
    stage.server.submit(0, Op::AdvanceStateMachine {
        machine,
        delta_seconds: 0.25,
    });
    barrier(&stage.server);
    assert!(!stage
        .server
        .drain()
        .iter()
        .any(|m| m.event == Event::Settled(machine)));

    // Crossing the layer's end settles on that advance.
    stage.server.submit(0, Op::AdvanceStateMachine {
        machine,
        delta_seconds: 20.0,
    });
    barrier(&stage.server);
    assert!(stage
        .server
        .drain()
        .iter()
        .any(|m| m.event == Event::Settled(machine)));
}

#[test]
fn property_round_trip_and_type_checks() {
    let stage = stage();
    let instance = stage.instance(None);

    assert_eq!(
        call(&stage.server, 10, Op::SetProperty {
            instance,
            path: "time".into(),
            value: PropertyValue::Number(4.5),
        }),
        Event::PropertySet { instance, path: "time".into() }
    );
    assert_eq!(
        call(&stage.server, 11, Op::GetProperty {
            instance,
            path: "time".into(),
            ty: PropertyType::Number,
        }),
        Event::PropertyValue {
            instance,
            path: "time".into(),
            value: PropertyValue::Number(4.5),
        }
    );

    // Writes never change a property's type.
    assert!(matches!(
        call(&stage.server, 12, Op::SetProperty {
            instance,
            path: "time".into(),
            value: PropertyValue::Boolean(true),
        }),
        Event::Error(ServerError::TypeMismatch { .. })
    ));
    // Nested default instances are reachable by path.
    assert_eq!(
        call(&stage.server, 13, Op::GetProperty {
            instance,
            path: "gear.label".into(),
            ty: PropertyType::String,
        }),
        Event::PropertyValue {
            instance,
            path: "gear.label".into(),
            value: PropertyValue::String("sword".into()),
        }
    );
}

#[test]
fn list_operations_and_indexed_paths() {
    let stage = stage();
    let hud = stage.instance(None);
    let sword = stage.instance(Some("item"));
    let shield = stage.instance(Some("item"));

    assert_eq!(
        call(&stage.server, 20, Op::AppendListItem {
            instance: hud,
            path: "inventory".into(),
            item: sword,
        }),
        Event::ListUpdated { instance: hud, path: "inventory".into(), length: 1 }
    );
    call(&stage.server, 21, Op::InsertListItem {
        instance: hud,
        path: "inventory".into(),
        index: 0,
        item: shield,
    });
    assert_eq!(
        call(&stage.server, 22, Op::GetListLength {
            instance: hud,
            path: "inventory".into(),
        }),
        Event::ListLength { instance: hud, path: "inventory".into(), length: 2 }
    );

    call(&stage.server, 23, Op::SetProperty {
        instance: shield,
        path: "label".into(),
        value: PropertyValue::String("shield".into()),
    });
    assert_eq!(
        call(&stage.server, 24, Op::GetProperty {
            instance: hud,
            path: "inventory[0].label".into(),
            ty: PropertyType::String,
        }),
        Event::PropertyValue {
            instance: hud,
            path: "inventory[0].label".into(),
            value: PropertyValue::String("shield".into()),
        }
    );

    call(&stage.server, 25, Op::SwapListItems {
        instance: hud,
        path: "inventory".into(),
        a: 0,
        b: 1,
    });
    assert!(matches!(
        call(&stage.server, 26, Op::RemoveListItem {
            instance: hud,
            path: "inventory".into(),
            index: 5,
        }),
        Event::Error(ServerError::Path { .. })
    ));
}

#[test]
fn subscriptions_notify_until_unsubscribed() {
    let stage = stage();
    let instance = stage.instance(None);
    call(&stage.server, 30, Op::Subscribe {
        instance,
        path: "time".into(),
        ty: PropertyType::Number,
    });
    // Subscribing twice is one subscription: one update per change.
    call(&stage.server, 31, Op::Subscribe {
        instance,
        path: "time".into(),
        ty: PropertyType::Number,
    });

    stage.server.submit(32, Op::SetProperty {
        instance,
        path: "time".into(),
        value: PropertyValue::Number(7.0),
    });
    barrier(&stage.server);
    let updates = stage
        .server
        .drain()
        .iter()
        .filter(|m| {
            m.request_id == 0
                && matches!(
                    &m.event,
                    Event::PropertyUpdated { value: PropertyValue::Number(v), .. } if *v == 7.0
                )
        })
        .count();
    assert_eq!(updates, 1);

    call(&stage.server, 33, Op::Unsubscribe {
        instance,
        path: "time".into(),
        ty: PropertyType::Number,
    });
    stage.server.submit(34, Op::SetProperty {
        instance,
        path: "time".into(),
        value: PropertyValue::Number(8.0),
    });
    barrier(&stage.server);
    let messages = stage.server.drain();
    // The write succeeded, but nobody is listening anymore.
    assert!(messages
        .iter()
        .any(|m| m.request_id == 34 && matches!(m.event, Event::PropertySet { .. })));
    assert!(!messages
        .iter()
        .any(|m| matches!(m.event, Event::PropertyUpdated { .. })));
}

#[test]
fn stale_handles_degrade_into_errors() {
    let stage = stage();
    call(&stage.server, 40, Op::DeleteArtboard { artboard: stage.artboard });
    assert!(matches!(
        call(&stage.server, 41, Op::ResizeArtboard {
            artboard: stage.artboard,
            width: 10.0,
            height: 10.0,
        }),
        Event::Error(ServerError::InvalidHandle { kind: ResourceKind::Artboard, .. })
    ));
    // Double free is an error too.
    assert!(matches!(
        call(&stage.server, 42, Op::DeleteArtboard { artboard: stage.artboard }),
        Event::Error(ServerError::InvalidHandle { .. })
    ));
}

#[test]
fn concurrent_advancers_interleave_without_loss() {
    let stage = stage();
    // Two independent machines, one per producer thread. Each gets its own
    // bound instance so applied advances are countable per handle.
    let machines = [stage.machine("timed"), stage.machine("timed")];
    let huds = [stage.instance(None), stage.instance(None)];
    for (i, (&machine, &hud)) in machines.iter().zip(&huds).enumerate() {
        call(&stage.server, 50 + i as u64, Op::BindViewModel { machine, instance: hud });
        call(&stage.server, 52 + i as u64, Op::Subscribe {
            instance: hud,
            path: "time".into(),
            ty: PropertyType::Number,
        });
    }

    // Two threads race 100 fire-and-forget advances each; the worker
    // serializes them all, losing and duplicating none.
    let server = &stage.server;
    std::thread::scope(|scope| {
        for &machine in &machines {
            scope.spawn(move || {
                for _ in 0..100 {
                    server.submit(0, Op::AdvanceStateMachine {
                        machine,
                        delta_seconds: 0.005,
                    });
                }
            });
        }
    });
    barrier(&stage.server);

    // Every applied advance produced exactly one binding write per machine.
    let messages = stage.server.drain();
    for &hud in &huds {
        let updates = messages
            .iter()
            .filter(|m| {
                matches!(&m.event, Event::PropertyUpdated { instance, .. } if *instance == hud)
            })
            .count();
        assert_eq!(updates, 100);

        // And the deltas all landed: elapsed is the sum of 100 advances.
        let Event::PropertyValue { value: PropertyValue::Number(time), .. } =
            call(&stage.server, 54, Op::GetProperty {
                instance: hud,
                path: "time".into(),
                ty: PropertyType::Number,
            })
        else {
            panic!("get failed");
        };
        assert!((time - 0.5).abs() < 1e-3, "elapsed was {time}");
    }
}

#[test]
fn run_once_runs_between_commands_and_rejects_reentry() {
    let server = Arc::new(server());
    let target = server
        .run_once(|exec| exec.create_render_target(4, 4, 1))
        .unwrap()
        .unwrap();
    assert_eq!(server.run_once(move |exec| exec.target_size(target)).unwrap(), Ok((4, 4)));

    let inner = server.clone();
    let reentry = server
        .run_once(move |_| inner.run_once(|_| ()).unwrap_err())
        .unwrap();
    assert_eq!(reentry, RunOnceError::Reentrant);
}

#[test]
fn draw_to_buffer_letterboxes_and_reads_back() {
    let stage = stage();
    let target = stage.target(8, 8);
    let event = call(&stage.server, 60, Op::DrawToBuffer {
        request: DrawRequest {
            target,
            artboard: stage.artboard,
            driver: None,
            fit: render::Fit::Contain,
            alignment: render::Alignment::CENTER,
            clear: Some(Color::BLACK),
        },
        flip: false,
    });
    let Event::PixelsReady { width: 8, height: 8, pixels, .. } = event else {
        panic!("draw failed: {event:?}");
    };
    // A 2:1 white artboard contained in a square: vertical letterboxing.
    assert_eq!(rgba(&pixels, 8, 4, 0), Color::BLACK.to_rgba8());
    assert_eq!(rgba(&pixels, 8, 4, 4), Color::WHITE.to_rgba8());
    assert_eq!(rgba(&pixels, 8, 4, 7), Color::BLACK.to_rgba8());
}

#[test]
fn batch_draw_flips_for_bottom_origin_consumers() {
    let stage = stage();
    let target = stage.target(2, 2);
    let event = call(&stage.server, 61, Op::DrawBatch {
        target,
        clear: Some(Color::BLACK),
        sprites: vec![Sprite {
            artboard: stage.artboard,
            driver: None,
            transform: [1.0, 0.0, 0.0, 1.0, 0.0, 0.0],
            // Fills the top half of the target.
            size: (2.0, 1.0),
        }],
        flip: true,
        readback: true,
    });
    let Event::PixelsReady { pixels, .. } = event else {
        panic!("batch failed: {event:?}");
    };
    // Flipped: the drawn row ends up at the bottom.
    assert_eq!(rgba(&pixels, 2, 0, 0), Color::BLACK.to_rgba8());
    assert_eq!(rgba(&pixels, 2, 0, 1), Color::WHITE.to_rgba8());
}

#[test]
fn per_frame_draw_failures_stay_off_the_message_queue() {
    let stage = stage();
    let target = stage.target(4, 4);
    let doomed = stage.artboard;
    call(&stage.server, 100, Op::DeleteArtboard { artboard: doomed });

    // The fire-and-forget draw path must not report a stale handle once per
    // frame: it logs once and skips, so repeats produce no error messages.
    for _ in 0..2 {
        stage.server.submit(0, Op::Draw(DrawRequest {
            target,
            artboard: doomed,
            driver: None,
            fit: render::Fit::Contain,
            alignment: render::Alignment::CENTER,
            clear: Some(Color::BLACK),
        }));
    }
    barrier(&stage.server);
    assert!(!stage
        .server
        .drain()
        .iter()
        .any(|m| matches!(m.event, Event::Error(_))));

    // The target itself is unharmed: a live artboard still draws into it.
    let Event::ArtboardCreated(fresh) =
        call(&stage.server, 101, Op::CreateDefaultArtboard { file: stage.file })
    else {
        panic!("artboard creation failed");
    };
    stage.server.submit(0, Op::Draw(DrawRequest {
        target,
        artboard: fresh,
        driver: None,
        fit: render::Fit::Fill,
        alignment: render::Alignment::CENTER,
        clear: Some(Color::BLACK),
    }));
    let pixels = stage
        .server
        .run_once(move |exec| exec.read_pixels(target, false))
        .unwrap()
        .unwrap();
    assert_eq!(rgba(&pixels, 4, 2, 2), Color::WHITE.to_rgba8());
}

#[test]
fn draws_with_foreign_drivers_are_rejected() {
    let stage = stage();
    let machine = stage.machine("idle");
    let Event::ArtboardCreated(other) =
        call(&stage.server, 70, Op::CreateDefaultArtboard { file: stage.file })
    else {
        panic!("artboard creation failed");
    };
    let target = stage.target(4, 4);
    assert!(matches!(
        call(&stage.server, 71, Op::DrawToBuffer {
            request: DrawRequest {
                target,
                artboard: other,
                driver: Some(Driver::Machine(machine)),
                fit: render::Fit::Contain,
                alignment: render::Alignment::CENTER,
                clear: None,
            },
            flip: false,
        }),
        Event::Error(ServerError::Draw(_))
    ));
}

#[test]
fn one_shot_animations_finish_once() {
    let stage = stage();
    let Event::AnimationCreated(animation) = call(&stage.server, 80, Op::CreateAnimation {
        artboard: stage.artboard,
        name: Some("intro".into()),
    }) else {
        panic!("animation creation failed");
    };
    for _ in 0..4 {
        stage.server.submit(0, Op::AdvanceAnimation {
            animation,
            delta_seconds: 0.4,
        });
    }
    barrier(&stage.server);
    let finishes = stage
        .server
        .drain()
        .iter()
        .filter(|m| m.event == Event::AnimationFinished(animation))
        .count();
    assert_eq!(finishes, 1);
}

#[test]
fn assets_decode_and_delete() {
    let server = server();
    let png = {
        let image = image::RgbaImage::from_pixel(2, 2, image::Rgba([1, 2, 3, 255]));
        let mut bytes = std::io::Cursor::new(Vec::new());
        image.write_to(&mut bytes, image::ImageFormat::Png).unwrap();
        bytes.into_inner().into_boxed_slice()
    };
    let Event::AssetDecoded(asset) = call(&server, 1, Op::DecodeImage {
        bytes: png,
        name: Some("icon".into()),
    }) else {
        panic!("decode failed");
    };

    // No audio decoder installed: clean failure, not a panic.
    assert!(matches!(
        call(&server, 2, Op::DecodeAudio { bytes: Box::new([0, 1, 2]), name: None }),
        Event::Error(ServerError::Decode(_))
    ));

    assert_eq!(call(&server, 3, Op::DeleteAsset { asset }), Event::AssetDeleted(asset));
    assert!(matches!(
        call(&server, 4, Op::DeleteAsset { asset }),
        Event::Error(ServerError::InvalidHandle { kind: ResourceKind::Asset, .. })
    ));
}

#[test]
fn startup_failure_is_synchronous() {
    let result = CommandServer::with_options(ServerOptions {
        context: render::ContextOptions {
            max_target_dim: 0,
            ..Default::default()
        },
        ..Default::default()
    });
    assert!(matches!(result, Err(StartupError::Context(_))));
}
