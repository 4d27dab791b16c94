use serde::{Deserialize, Serialize};

/// A single canvas cell. `(x, y)` is the identity; at most one record exists
/// per coordinate pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pixel {
    pub x: i32,
    pub y: i32,
    pub color: String,
}

/// Inbound frames. Anything that does not deserialize into one of these
/// variants is dropped without affecting the connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    Place { x: i32, y: i32, color: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// Full canvas snapshot, sent exactly once per connection right after
    /// connect, to that connection only.
    Init { pixels: Vec<Pixel> },
    /// A durably confirmed placement, broadcast to every live connection.
    Pixel { x: i32, y: i32, color: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_place_message() {
        let msg: ClientMessage =
            serde_json::from_str(r##"{"type":"place","x":3,"y":4,"color":"#fff"}"##).unwrap();
        let ClientMessage::Place { x, y, color } = msg;
        assert_eq!((x, y, color.as_str()), (3, 4, "#fff"));
    }

    #[test]
    fn rejects_non_integer_coordinate() {
        let res = serde_json::from_str::<ClientMessage>(
            r#"{"type":"place","x":"a","y":1,"color":"red"}"#,
        );
        assert!(res.is_err());
    }

    #[test]
    fn rejects_unknown_type() {
        let res =
            serde_json::from_str::<ClientMessage>(r#"{"type":"erase","x":1,"y":1,"color":"red"}"#);
        assert!(res.is_err());
    }

    #[test]
    fn rejects_missing_type_and_missing_color() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"x":1,"y":1,"color":"red"}"#).is_err());
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"place","x":1,"y":1}"#).is_err());
    }

    #[test]
    fn rejects_unparseable_payload() {
        assert!(serde_json::from_str::<ClientMessage>("not json at all").is_err());
    }

    #[test]
    fn init_wire_shape() {
        let msg = ServerMessage::Init {
            pixels: vec![Pixel {
                x: 0,
                y: 0,
                color: "red".to_string(),
            }],
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({"type":"init","pixels":[{"x":0,"y":0,"color":"red"}]})
        );
    }

    #[test]
    fn pixel_wire_shape() {
        let msg = ServerMessage::Pixel {
            x: 3,
            y: 4,
            color: "#fff".to_string(),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value, json!({"type":"pixel","x":3,"y":4,"color":"#fff"}));
    }
}
