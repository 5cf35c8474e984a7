#![no_main]

use libfuzzer_sys::fuzz_target;
use planning_poker_client::protocol::{RoomBroadcast, ServerMessage};

fuzz_target!(|data: &[u8]| {
    let Ok(message) = serde_json::from_slice::<ServerMessage>(data) else {
        return;
    };

    // Anything that parsed must be classifiable and re-encodable.
    if let ServerMessage::Broadcast(event) = &message {
        let _ = event.kind();
        if let RoomBroadcast::ParticipantListUpdated(list) = event {
            for participant in list {
                let _ = participant.voting_role.is_voter();
            }
        }
    }
    let json = serde_json::to_string(&message).expect("parsed message must serialize");
    let again: ServerMessage = serde_json::from_str(&json).expect("serialized message must parse");
    assert_eq!(message, again);
});
