use proptest::prelude::*;

use port_session::{
    ConnectionParams, ConnectionRegistry, EncodeError, SendMode, encode,
};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn arb_numeric_mode() -> impl Strategy<Value = SendMode> {
    prop_oneof![Just(SendMode::Decimal), Just(SendMode::Hex)]
}

fn render(value: u32, mode: SendMode) -> String {
    match mode {
        SendMode::Hex => format!("{value:x}"),
        _ => value.to_string(),
    }
}

// --- Frame encoder ---

proptest! {
    #[test]
    fn out_of_range_token_rejects_frame(
        mode in arb_numeric_mode(),
        before in prop::collection::vec(0u32..256, 0..8),
        bad in 256u32..100_000,
        after in prop::collection::vec(0u32..256, 0..8),
        cr in any::<bool>(),
        lf in any::<bool>(),
    ) {
        let tokens: Vec<String> = before
            .iter()
            .chain(std::iter::once(&bad))
            .chain(after.iter())
            .map(|v| render(*v, mode))
            .collect();
        let input = tokens.join(",");

        let result = encode(&input, mode, cr, lf);
        let is_out_of_range = matches!(result, Err(EncodeError::ValueOutOfRange { .. }));
        prop_assert!(is_out_of_range);
    }

    #[test]
    fn in_range_tokens_encode_in_order(
        mode in arb_numeric_mode(),
        values in prop::collection::vec(0u32..256, 0..16),
        cr in any::<bool>(),
        lf in any::<bool>(),
    ) {
        let input = values
            .iter()
            .map(|v| render(*v, mode))
            .collect::<Vec<_>>()
            .join(" ");

        let frame = encode(&input, mode, cr, lf).unwrap();
        let mut expected: Vec<u8> = values.iter().map(|v| *v as u8).collect();
        if cr { expected.push(0x0d); }
        if lf { expected.push(0x0a); }
        prop_assert_eq!(frame.as_bytes(), expected.as_slice());
    }

    #[test]
    fn ascii_frame_is_input_then_terminators(
        input in ".*",
        cr in any::<bool>(),
        lf in any::<bool>(),
    ) {
        let frame = encode(&input, SendMode::Ascii, cr, lf).unwrap();
        let mut expected = input.as_bytes().to_vec();
        if cr { expected.push(b'\r'); }
        if lf { expected.push(b'\n'); }
        prop_assert_eq!(frame.into_inner(), expected);
    }
}

// --- Receive buffer ---

proptest! {
    #[test]
    fn buffer_is_tail_of_stream(
        max_bytes in 1usize..64,
        chunks in prop::collection::vec("[a-zé日]{0,20}", 0..20),
    ) {
        let rt = runtime();
        let (buffer, len) = rt.block_on(async {
            let registry = ConnectionRegistry::new();
            let id = registry
                .add_port(ConnectionParams { name: "COM1".to_string(), baud_rate: 9600 })
                .await
                .unwrap();
            registry.set_display_size(id, max_bytes).await.unwrap();
            registry.set_is_active(id, true).await.unwrap();
            for chunk in &chunks {
                registry.append_received(id, chunk).await.unwrap();
            }
            let c = registry.get(id).await.unwrap();
            (c.rx_buffer().to_string(), c.rx_len())
        });

        let stream: Vec<char> = chunks.concat().chars().collect();
        let keep = stream.len().min(max_bytes);
        let expected: String = stream[stream.len() - keep..].iter().collect();
        prop_assert!(len <= max_bytes);
        prop_assert_eq!(buffer, expected);
    }

    #[test]
    fn deactivation_always_empties_buffer(
        content in ".{0,50}",
        use_running in any::<bool>(),
    ) {
        let rt = runtime();
        let buffer = rt.block_on(async {
            let registry = ConnectionRegistry::new();
            let id = registry
                .add_port(ConnectionParams { name: "COM1".to_string(), baud_rate: 9600 })
                .await
                .unwrap();
            registry.set_is_active(id, true).await.unwrap();
            registry.append_received(id, &content).await.unwrap();
            if use_running {
                registry.set_is_running(id, false).await.unwrap();
            } else {
                registry.set_is_active(id, false).await.unwrap();
            }
            registry.get(id).await.unwrap().rx_buffer().to_string()
        });
        prop_assert_eq!(buffer, "");
    }

    #[test]
    fn remove_twice_equals_remove_once(count in 1usize..6, victim in 0usize..6) {
        let rt = runtime();
        let (once, twice) = rt.block_on(async {
            let registry = ConnectionRegistry::new();
            let mut ids = Vec::new();
            for i in 0..count {
                ids.push(
                    registry
                        .add_port(ConnectionParams { name: format!("COM{i}"), baud_rate: 9600 })
                        .await
                        .unwrap(),
                );
            }
            let target = ids[victim % count];
            registry.remove_port(target).await;
            let once = registry.list().await;
            registry.remove_port(target).await;
            let twice = registry.list().await;
            (once, twice)
        });
        prop_assert_eq!(once, twice);
    }
}
