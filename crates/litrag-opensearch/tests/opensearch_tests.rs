use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use litrag_core::config::OpenSearchSettings;
use litrag_core::error::Error;
use litrag_core::traits::SearchIndex;
use litrag_core::types::{HybridQuery, LexicalQuery, VectorQuery};
use litrag_opensearch::OpenSearchIndex;

#[derive(Debug, Clone)]
struct Recorded {
    index: String,
    pipeline: Option<String>,
    body: Value,
}

#[derive(Default)]
struct MockCluster {
    replies: Mutex<VecDeque<(u16, Value)>>,
    requests: Mutex<Vec<Recorded>>,
}

async fn search(
    State(cluster): State<Arc<MockCluster>>,
    Path(index): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    cluster.requests.lock().unwrap().push(Recorded {
        index,
        pipeline: params.get("search_pipeline").cloned(),
        body,
    });
    let (status, reply) = cluster
        .replies
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or((200, json!({ "hits": { "hits": [] } })));
    (StatusCode::from_u16(status).unwrap(), Json(reply))
}

async fn start(replies: Vec<(u16, Value)>) -> (Arc<MockCluster>, SocketAddr, CancellationToken) {
    let cluster = Arc::new(MockCluster { replies: Mutex::new(replies.into()), ..MockCluster::default() });
    let router = Router::new()
        .route("/{index}/_search", post(search))
        .with_state(Arc::clone(&cluster));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local_addr");
    let ct = CancellationToken::new();
    tokio::spawn({
        let ct = ct.clone();
        async move {
            let _ = axum::serve(listener, router)
                .with_graceful_shutdown(async move { ct.cancelled_owned().await })
                .await;
        }
    });
    (cluster, addr, ct)
}

fn client(addr: SocketAddr) -> OpenSearchIndex {
    let settings = OpenSearchSettings { url: format!("http://{addr}"), ..OpenSearchSettings::default() };
    OpenSearchIndex::new(&settings).expect("client")
}

fn hybrid_query() -> HybridQuery {
    HybridQuery {
        lexical: LexicalQuery { text: "sleep".into(), fields: vec!["text".into()] },
        vector: VectorQuery { vector: vec![0.5, 0.5], k: 8 },
    }
}

#[tokio::test]
async fn hybrid_sends_pipeline_and_decodes_hits() {
    let (cluster, addr, ct) = start(vec![(200, json!({
        "hits": { "hits": [
            { "_id": "5_1", "_score": 0.9, "_source": { "pmid": 5, "abstract_fragment": "b", "fragment_id": 1, "number_of_fragments": 2 } },
            { "_id": "6_0", "_score": 0.4, "_source": { "pmid": 6, "abstract_fragment": "a", "fragment_id": 0, "number_of_fragments": 1 } }
        ]}
    }))]).await;

    let hits = client(addr)
        .hybrid(&hybrid_query(), "hybrid_search_pipeline_weight_0.50", None, 8)
        .await
        .expect("hybrid");
    assert_eq!(hits.iter().map(|h| h.fragment.id.as_str()).collect::<Vec<_>>(), vec!["5_1", "6_0"]);

    let recorded = cluster.requests.lock().unwrap().clone();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].index, "abstract_fragments");
    assert_eq!(recorded[0].pipeline.as_deref(), Some("hybrid_search_pipeline_weight_0.50"));
    assert_eq!(recorded[0].body["size"], json!(8));
    ct.cancel();
}

#[tokio::test]
async fn unknown_pipeline_is_reported_with_its_id() {
    let (_cluster, addr, ct) = start(vec![(400, json!({
        "error": { "type": "illegal_argument_exception", "reason": "Pipeline hybrid_search_pipeline_weight_0.35 is not defined" },
        "status": 400
    }))]).await;
    let err = client(addr)
        .hybrid(&hybrid_query(), "hybrid_search_pipeline_weight_0.35", None, 8)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::PipelineNotFound(ref id) if id == "hybrid_search_pipeline_weight_0.35"));
    ct.cancel();
}

#[tokio::test]
async fn overloaded_cluster_is_transient() {
    let (_cluster, addr, ct) = start(vec![(503, json!({ "error": "unavailable" }))]).await;
    let err = client(addr)
        .lexical(&LexicalQuery { text: "q".into(), fields: vec!["text".into()] }, None, 5)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::IndexUnavailable { operation: "lexical", .. }));
    assert!(err.is_transient());
    ct.cancel();
}

#[tokio::test]
async fn zero_hits_is_not_an_error() {
    let (_cluster, addr, ct) = start(vec![(200, json!({ "took": 1 }))]).await;
    let hits = client(addr)
        .vector(&VectorQuery { vector: vec![1.0, 0.0], k: 3 }, None)
        .await
        .expect("vector");
    assert!(hits.is_empty());
    ct.cancel();
}

#[tokio::test]
async fn unreachable_cluster_is_index_unavailable() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    let err = client(addr)
        .lexical(&LexicalQuery { text: "q".into(), fields: vec!["text".into()] }, None, 5)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::IndexUnavailable { .. }));
}

#[tokio::test]
async fn documents_go_to_the_abstracts_index() {
    let (cluster, addr, ct) = start(vec![(200, json!({
        "hits": { "hits": [ { "_id": "5", "_source": { "pmid": 5, "title": "Five", "abstract": "x" } } ] }
    }))]).await;
    let docs = client(addr)
        .documents(&["5".to_string(), "6".to_string()], None)
        .await
        .expect("documents");
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].title, "Five");
    let recorded = cluster.requests.lock().unwrap().clone();
    assert_eq!(recorded[0].index, "abstracts");
    assert_eq!(recorded[0].pipeline, None);
    ct.cancel();
}
