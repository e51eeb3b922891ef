//! Test-only FTDC writer: BSON encoding, delta streams, zlib chunks and
//! capture buffers. Mirrors what mongod writes into `diagnostic.data`.

use std::io::Write;

use flate2::Compression;
use flate2::write::ZlibEncoder;

use crate::bson::{Document, Value};

pub(crate) fn encode_document(doc: &Document) -> Vec<u8> {
    let mut body = Vec::new();
    for (key, value) in doc.iter() {
        encode_element(&mut body, key, value);
    }
    let mut out = Vec::with_capacity(body.len() + 5);
    out.extend_from_slice(&((body.len() + 5) as i32).to_le_bytes());
    out.extend_from_slice(&body);
    out.push(0);
    out
}

fn encode_element(out: &mut Vec<u8>, key: &str, value: &Value) {
    let tag = match value {
        Value::Double(_) => 0x01,
        Value::String(_) => 0x02,
        Value::Document(_) => 0x03,
        Value::Array(_) => 0x04,
        Value::Binary { .. } => 0x05,
        Value::ObjectId(_) => 0x07,
        Value::Boolean(_) => 0x08,
        Value::DateTime(_) => 0x09,
        Value::Null => 0x0A,
        Value::Int32(_) => 0x10,
        Value::Timestamp { .. } => 0x11,
        Value::Int64(_) => 0x12,
        Value::Decimal128(_) => 0x13,
        Value::Other(kind) => panic!("test encoder cannot write {:?}", kind),
    };
    out.push(tag);
    out.extend_from_slice(key.as_bytes());
    out.push(0);
    match value {
        Value::Double(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::String(s) => {
            out.extend_from_slice(&((s.len() + 1) as i32).to_le_bytes());
            out.extend_from_slice(s.as_bytes());
            out.push(0);
        }
        Value::Document(d) => out.extend_from_slice(&encode_document(d)),
        Value::Array(items) => {
            let mut doc = Document::new();
            for (i, item) in items.iter().enumerate() {
                doc.push(i.to_string(), item.clone());
            }
            out.extend_from_slice(&encode_document(&doc));
        }
        Value::Binary { subtype, bytes } => {
            out.extend_from_slice(&(bytes.len() as i32).to_le_bytes());
            out.push(*subtype);
            out.extend_from_slice(bytes);
        }
        Value::ObjectId(oid) => out.extend_from_slice(oid),
        Value::Boolean(b) => out.push(u8::from(*b)),
        Value::DateTime(ms) => out.extend_from_slice(&ms.to_le_bytes()),
        Value::Null | Value::Other(_) => {}
        Value::Int32(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Timestamp { t, i } => {
            out.extend_from_slice(&i.to_le_bytes());
            out.extend_from_slice(&t.to_le_bytes());
        }
        Value::Int64(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Decimal128(bytes) => out.extend_from_slice(bytes),
    }
}

pub(crate) fn write_varint(out: &mut Vec<u8>, mut v: u64) {
    while v >= 0x80 {
        out.push((v as u8 & 0x7f) | 0x80);
        v >>= 7;
    }
    out.push(v as u8);
}

/// Encodes one attribute's deltas with zero-run compression.
pub(crate) fn encode_delta_column(out: &mut Vec<u8>, deltas: &[u64]) {
    let mut i = 0;
    while i < deltas.len() {
        write_varint(out, deltas[i]);
        if deltas[i] == 0 {
            let run = deltas[i + 1..].iter().take_while(|&&d| d == 0).count();
            write_varint(out, run as u64);
            i += run;
        }
        i += 1;
    }
}

/// Builds an uncompressed metric block from a reference document and the
/// full value series of every flattened attribute (element 0 of each series
/// must be the reference value).
pub(crate) fn build_block(reference: &Document, series: &[Vec<u64>]) -> Vec<u8> {
    let num_deltas = series.first().map_or(0, |s| s.len() - 1);
    let mut block = encode_document(reference);
    block.extend_from_slice(&(series.len() as u32).to_le_bytes());
    block.extend_from_slice(&(num_deltas as u32).to_le_bytes());
    for values in series {
        let deltas: Vec<u64> = values.windows(2).map(|w| w[1].wrapping_sub(w[0])).collect();
        encode_delta_column(&mut block, &deltas);
    }
    block
}

/// Builds a raw block with hand-written header counts and stream bytes.
pub(crate) fn build_raw_block(
    reference: &Document,
    num_attribs: u32,
    num_deltas: u32,
    stream: &[u8],
) -> Vec<u8> {
    let mut block = encode_document(reference);
    block.extend_from_slice(&num_attribs.to_le_bytes());
    block.extend_from_slice(&num_deltas.to_le_bytes());
    block.extend_from_slice(stream);
    block
}

/// Wraps a block the way FTDC stores it: uncompressed length, then zlib.
pub(crate) fn compress_block(block: &[u8]) -> Vec<u8> {
    let mut payload = (block.len() as u32).to_le_bytes().to_vec();
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(block).unwrap();
    payload.extend_from_slice(&encoder.finish().unwrap());
    payload
}

pub(crate) fn metadata_envelope(doc: Document) -> Document {
    Document::new()
        .with("_id", Value::DateTime(1_507_838_933_000))
        .with("type", Value::Int32(0))
        .with("doc", Value::Document(doc))
}

pub(crate) fn chunk_envelope(payload: Vec<u8>) -> Document {
    Document::new()
        .with("_id", Value::DateTime(1_507_838_933_000))
        .with("type", Value::Int32(1))
        .with(
            "data",
            Value::Binary {
                subtype: 0,
                bytes: payload,
            },
        )
}

/// Concatenates envelope documents into a capture buffer.
pub(crate) fn capture(envelopes: &[Document]) -> Vec<u8> {
    envelopes.iter().flat_map(encode_document).collect()
}

/// A small serverStatus/systemMetrics reference sample as mongod writes it.
pub(crate) fn reference_sample(local_time_ms: i64, uptime: i64, pid: i64) -> Document {
    let server_status = Document::new()
        .with("host", Value::String("db01.example.net:27017".into()))
        .with("version", Value::String("4.4.6".into()))
        .with("process", Value::String("mongod".into()))
        .with("pid", Value::Int64(pid))
        .with("uptime", Value::Double(uptime as f64))
        .with("localTime", Value::DateTime(local_time_ms))
        .with(
            "connections",
            Value::Document(
                Document::new()
                    .with("current", Value::Int32(10))
                    .with("available", Value::Int32(800))
                    .with("totalCreated", Value::Int32(50))
                    .with("active", Value::Int32(3)),
            ),
        )
        .with(
            "mem",
            Value::Document(
                Document::new()
                    .with("bits", Value::Int32(64))
                    .with("resident", Value::Int32(1024))
                    .with("virtual", Value::Int32(2048))
                    .with("supported", Value::Boolean(true)),
            ),
        )
        .with(
            "opcounters",
            Value::Document(
                Document::new()
                    .with("insert", Value::Int64(100))
                    .with("query", Value::Int64(200))
                    .with("update", Value::Int64(30))
                    .with("delete", Value::Int64(4))
                    .with("getmore", Value::Int64(5))
                    .with("command", Value::Int64(600)),
            ),
        )
        .with(
            "opLatencies",
            Value::Document(
                Document::new().with(
                    "reads",
                    Value::Document(
                        Document::new()
                            .with("latency", Value::Int64(50_000))
                            .with("ops", Value::Int64(10)),
                    ),
                ),
            ),
        )
        .with(
            "wiredTiger",
            Value::Document(
                Document::new().with(
                    "cache",
                    Value::Document(
                        Document::new()
                            .with("bytes currently in the cache", Value::Int64(1 << 30))
                            .with("maximum bytes configured", Value::Int64(2 << 30)),
                    ),
                ),
            ),
        );

    let system_metrics = Document::new()
        .with(
            "cpu",
            Value::Document(
                Document::new()
                    .with("user_ms", Value::Int64(1000))
                    .with("system_ms", Value::Int64(500))
                    .with("idle_ms", Value::Int64(8000)),
            ),
        )
        .with(
            "disks",
            Value::Document(
                Document::new().with(
                    "sda",
                    Value::Document(
                        Document::new()
                            .with("reads", Value::Int64(10))
                            .with("writes", Value::Int64(20))
                            .with("io_time_ms", Value::Int64(30)),
                    ),
                ),
            ),
        );

    Document::new()
        .with("start", Value::DateTime(local_time_ms))
        .with("serverStatus", Value::Document(server_status))
        .with("systemMetrics", Value::Document(system_metrics))
        .with("end", Value::DateTime(local_time_ms + 3))
}

/// `replSetGetStatus` section with pv1 optimes; members are
/// `(name, state, optime seconds)`.
pub(crate) fn repl_set_status(date_ms: i64, members: &[(&str, i32, u32)]) -> Value {
    let members = members
        .iter()
        .enumerate()
        .map(|(id, &(name, state, t))| {
            Value::Document(
                Document::new()
                    .with("_id", Value::Int32(id as i32))
                    .with("name", Value::String(name.into()))
                    .with("health", Value::Double(1.0))
                    .with("state", Value::Int32(state))
                    .with(
                        "optime",
                        Value::Document(
                            Document::new()
                                .with("ts", Value::Timestamp { t, i: 1 })
                                .with("t", Value::Int64(1)),
                        ),
                    ),
            )
        })
        .collect();
    Value::Document(
        Document::new()
            .with("set", Value::String("rs0".into()))
            .with("date", Value::DateTime(date_ms))
            .with("members", Value::Array(members)),
    )
}
