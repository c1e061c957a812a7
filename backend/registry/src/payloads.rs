//! Protobuf messages exchanged with the frontend.
//!
//! Kept in sync with the frontend's `payloads.proto`:
//!
//! ```proto
//! message Choice {
//!     repeated int64 candidate_ids = 1;
//! }
//! ```

/// Candidates picked by one voter for one position. The position comes from
/// the request path.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Choice {
    #[prost(int64, repeated, tag = "1")]
    pub candidate_ids: ::prost::alloc::vec::Vec<i64>,
}

#[cfg(test)]
mod tests {
    use prost::Message;

    use super::Choice;
    use crate::get_choice_from_bytes;

    #[test]
    fn decodes_encoded_choice() {
        let choice = Choice {
            candidate_ids: vec![3, 1],
        };

        let decoded = get_choice_from_bytes(choice.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded.candidate_ids, vec![3, 1]);
    }

    #[test]
    fn rejects_garbage() {
        assert!(get_choice_from_bytes(&[0xff, 0xff, 0xff][..]).is_err());
    }
}
