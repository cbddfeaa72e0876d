use super::Transport;
use super::channel::{ChannelPeer, ChannelTransport};
use crate::application::tooling::error::ProtocolError;
use crate::application::tooling::message::{METHOD_NOT_FOUND, Message, RequestId};
use crate::constants::MCP_PROTOCOL_VERSION;
use crate::domain::Coordinate;
use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

const MOCK_ENDPOINT: &str = "mock://amap";

const PRESET_PLACES: &[(&str, f64, f64)] = &[
    ("北京", 116.397128, 39.916527),
    ("上海", 121.473701, 31.230416),
    ("广州", 113.264385, 23.129112),
    ("深圳", 114.057868, 22.543099),
    ("杭州", 120.155070, 30.274085),
    ("成都", 104.065735, 30.659462),
    ("西安", 108.940175, 34.341568),
    ("重庆", 106.551643, 29.563761),
    ("南京", 118.796623, 32.059344),
    ("武汉", 114.305539, 30.593102),
];

/// Canned tool host answering geocoding requests for a fixed set of places.
#[derive(Debug, Clone)]
pub struct MockToolHost {
    places: Vec<(String, Coordinate)>,
}

impl Default for MockToolHost {
    fn default() -> Self {
        let places = PRESET_PLACES
            .iter()
            .filter_map(|(name, lon, lat)| {
                Coordinate::checked(*lon, *lat).map(|coord| (name.to_string(), coord))
            })
            .collect();
        Self { places }
    }
}

impl MockToolHost {
    pub fn with_place(mut self, name: impl Into<String>, coordinate: Coordinate) -> Self {
        self.places.push((name.into(), coordinate));
        self
    }

    /// First preset whose name occurs in `query`.
    pub fn lookup(&self, query: &str) -> Option<(&str, Coordinate)> {
        self.places
            .iter()
            .find(|(name, _)| query.contains(name.as_str()))
            .map(|(name, coord)| (name.as_str(), *coord))
    }

    /// Answers requests until the transport side hangs up.
    pub async fn serve(self, mut peer: ChannelPeer) {
        while let Some(message) = peer.next_message().await {
            let Message::Request { id, method, params } = message else {
                continue;
            };
            let reply = self.handle(id, &method, params.unwrap_or(Value::Null));
            if !peer.send_message(&reply) {
                break;
            }
        }
        debug!("mock tool host stopped");
    }

    fn handle(&self, id: RequestId, method: &str, params: Value) -> Message {
        match method {
            "initialize" => Message::result(
                id,
                json!({
                    "protocolVersion": MCP_PROTOCOL_VERSION,
                    "capabilities": { "tools": { "listChanged": false } },
                    "serverInfo": { "name": "amap-mock", "version": env!("CARGO_PKG_VERSION") },
                    "instructions": "Offline geocoding for well-known Chinese cities."
                }),
            ),
            "ping" => Message::result(id, json!({})),
            "tools/list" => Message::result(id, catalogue()),
            "tools/call" => {
                let name = params.get("name").and_then(Value::as_str).unwrap_or_default();
                let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);
                Message::result(id, self.call_tool(name, &arguments))
            }
            other => Message::error(id, METHOD_NOT_FOUND, format!("method '{other}' not found")),
        }
    }

    fn call_tool(&self, name: &str, arguments: &Value) -> Value {
        let argument = |key: &str| {
            arguments
                .get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .unwrap_or_default()
        };
        match name {
            "maps_geo" => {
                let address = argument("address");
                match self.lookup(address) {
                    Some((place, coord)) => text_result(json!({
                        "results": [{
                            "country": "中国",
                            "city": format!("{place}市"),
                            "formatted_address": format!("{place}市"),
                            "location": coord.to_string(),
                            "level": "市"
                        }]
                    })),
                    None => error_result(format!("no geocoding result for '{address}'")),
                }
            }
            "maps_text_search" => {
                let keywords = argument("keywords");
                match self.lookup(keywords) {
                    Some((place, coord)) => text_result(json!({
                        "suggestion": { "keywords": "", "cities": [] },
                        "pois": [{
                            "id": format!("mock-{place}"),
                            "name": keywords,
                            "address": format!("{place}市"),
                            "location": coord.to_string()
                        }]
                    })),
                    None => error_result(format!("no place matches '{keywords}'")),
                }
            }
            "maps_regeocode" => {
                let location = argument("location");
                let Some(target) = Coordinate::parse_pair(location) else {
                    return error_result(format!("invalid location '{location}'"));
                };
                match self.nearest(target) {
                    Some(place) => text_result(json!({
                        "country": "中国",
                        "province": format!("{place}市"),
                        "city": format!("{place}市"),
                        "formatted_address": format!("{place}市")
                    })),
                    None => error_result("no preset places configured".to_string()),
                }
            }
            other => error_result(format!("unknown tool '{other}'")),
        }
    }

    fn nearest(&self, target: Coordinate) -> Option<&str> {
        let distance = |coord: &Coordinate| {
            (coord.longitude - target.longitude).powi(2) + (coord.latitude - target.latitude).powi(2)
        };
        self.places
            .iter()
            .min_by(|(_, a), (_, b)| distance(a).total_cmp(&distance(b)))
            .map(|(name, _)| name.as_str())
    }
}

fn catalogue() -> Value {
    json!({
        "tools": [
            {
                "name": "maps_geo",
                "description": "将详细的结构化地址转换为经纬度坐标",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "address": { "type": "string", "description": "待解析的结构化地址信息" },
                        "city": { "type": "string", "description": "指定查询的城市" }
                    },
                    "required": ["address"]
                }
            },
            {
                "name": "maps_text_search",
                "description": "关键词搜索 POI",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "keywords": { "type": "string", "description": "搜索关键词" },
                        "city": { "type": "string", "description": "查询城市" }
                    },
                    "required": ["keywords"]
                }
            },
            {
                "name": "maps_regeocode",
                "description": "将经纬度坐标转换为行政区划地址信息",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "location": { "type": "string", "description": "经度,纬度" }
                    },
                    "required": ["location"]
                }
            }
        ]
    })
}

fn text_result(payload: Value) -> Value {
    json!({
        "content": [{ "type": "text", "text": payload.to_string() }],
        "isError": false
    })
}

fn error_result(message: String) -> Value {
    json!({
        "content": [{ "type": "text", "text": message }],
        "isError": true
    })
}

/// Channel transport whose peer is a [`MockToolHost`], started on connect.
pub struct MockTransport {
    channel: ChannelTransport,
    host: MockToolHost,
    peer: AsyncMutex<Option<ChannelPeer>>,
    task: AsyncMutex<Option<JoinHandle<()>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::with_host(MockToolHost::default())
    }

    pub fn with_host(host: MockToolHost) -> Self {
        let (channel, peer) = ChannelTransport::pair(MOCK_ENDPOINT);
        Self {
            channel,
            host,
            peer: AsyncMutex::new(Some(peer)),
            task: AsyncMutex::new(None),
        }
    }

    pub fn frames_sent(&self) -> usize {
        self.channel.frames_sent()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn endpoint(&self) -> &str {
        self.channel.endpoint()
    }

    async fn connect(&self) -> Result<(), ProtocolError> {
        self.channel.connect().await?;
        let Some(peer) = self.peer.lock().await.take() else {
            return Ok(());
        };
        let host = self.host.clone();
        *self.task.lock().await = Some(tokio::spawn(host.serve(peer)));
        info!(endpoint = MOCK_ENDPOINT, "mock tool host started");
        Ok(())
    }

    async fn send(&self, frame: &str) -> Result<(), ProtocolError> {
        self.channel.send(frame).await
    }

    async fn receive(&self) -> Result<String, ProtocolError> {
        self.channel.receive().await
    }

    async fn close(&self) {
        self.channel.close().await;
        if let Some(task) = self.task.lock().await.take() {
            task.abort();
        }
    }
}
