/// Integration tests with mocked external APIs
/// Exercises the enrichment pipeline, the LLM helpers and the HTTP layer
/// against wiremock servers instead of BrasilAPI, DataSUS and OpenRouter.
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use health_sales_ai::ai::{self, InteractionContext};
use health_sales_ai::api;
use health_sales_ai::cache_validator::ResponseCache;
use health_sales_ai::config::Config;
use health_sales_ai::db_storage::ProspectStorage;
use health_sales_ai::enrichment::EnrichmentPipeline;
use health_sales_ai::errors::EnrichmentError;
use health_sales_ai::handlers::AppState;
use health_sales_ai::llm_client::{LlmClient, LlmError};
use health_sales_ai::models::{CnesSearchContext, InteractionType, ProspectIdentity};
use health_sales_ai::services::{BrasilApiService, CnesService};
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{any, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CNPJ: &str = "11222333000181";
const REGISTRY_PATH: &str = "/api/cnpj/v1/11222333000181";
const CNES_PATH: &str = "/cnes/estabelecimentos";

/// Helper function to create test config
fn create_test_config(base_url: &str) -> Config {
    Config {
        database_url: "postgresql://localhost/unused".to_string(),
        port: 3000,
        brasil_api_base_url: format!("{}/api/cnpj/v1", base_url),
        cnes_api_base_url: format!("{}{}", base_url, CNES_PATH),
        openrouter_base_url: base_url.to_string(),
        openrouter_api_key: Some("test-key".to_string()),
        ai_model: "test-model".to_string(),
        api_token: None,
    }
}

fn registry_record(situacao: &str) -> Value {
    json!({
        "cnpj": CNPJ,
        "razao_social": "HOSPITAL SAO LUCAS LTDA",
        "nome_fantasia": "HOSPITAL SAO LUCAS",
        "porte": "DEMAIS",
        "capital_social": 2500000,
        "descricao_situacao_cadastral": situacao,
        "cnae_fiscal": 8610101,
        "cnae_fiscal_descricao": "Atividades de atendimento hospitalar",
        "municipio": "CURITIBA",
        "uf": "PR",
        "ddd_telefone_1": "4133334444",
        "qsa": []
    })
}

fn cnes_record() -> Value {
    json!({
        "codigo_cnes": 2384299,
        "descricao_tipo_unidade": "HOSPITAL GERAL",
        "qt_leitos_sus": 150,
        "qt_leitos_nao_sus": 60
    })
}

async fn mount_registry(server: &MockServer, status: u16, body: Value) {
    Mock::given(method("GET"))
        .and(path(REGISTRY_PATH))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(server)
        .await;
}

/// CNES must not be contacted at all.
async fn forbid_cnes(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(CNES_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_enrich_end_to_end() {
    let server = MockServer::start().await;
    mount_registry(&server, 200, registry_record("ATIVA")).await;

    Mock::given(method("GET"))
        .and(path(CNES_PATH))
        .and(query_param("cnpj", CNPJ))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"estabelecimentos": [cnes_record()]})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = EnrichmentPipeline::new(&create_test_config(&server.uri()));
    let enriched = pipeline.enrich("11.222.333/0001-81").await.unwrap();

    let profile = &enriched.profile;
    assert_eq!(profile.registry.cnpj, CNPJ);
    assert_eq!(profile.registry.razao_social.as_deref(), Some("HOSPITAL SAO LUCAS LTDA"));
    assert_eq!(profile.facility.cnes_codigo.as_deref(), Some("2384299"));
    assert_eq!(profile.facility.leitos_total, Some(210));
    assert_eq!(profile.segmento, "hospital_grande");
    assert_eq!(enriched.registry_raw, registry_record("ATIVA"));
    assert_eq!(profile.facility.dados_cnes_raw, Some(cnes_record()));
}

#[tokio::test]
async fn test_invalid_cnpj_makes_no_requests() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let pipeline = EnrichmentPipeline::new(&create_test_config(&server.uri()));
    let failure = pipeline.enrich("123.456").await.unwrap_err();

    assert!(matches!(failure.error, EnrichmentError::InvalidInput(_)));
    assert!(failure.registry_raw.is_none());
}

#[tokio::test]
async fn test_registry_failure_is_upstream_unavailable() {
    let server = MockServer::start().await;
    mount_registry(&server, 500, json!({"message": "internal"})).await;
    forbid_cnes(&server).await;

    let pipeline = EnrichmentPipeline::new(&create_test_config(&server.uri()));
    let failure = pipeline.enrich(CNPJ).await.unwrap_err();

    match failure.error {
        EnrichmentError::UpstreamUnavailable { status, .. } => assert_eq!(status, Some(500)),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_inactive_record_is_rejected_with_raw_payload() {
    let server = MockServer::start().await;
    mount_registry(&server, 200, registry_record("BAIXADA")).await;
    forbid_cnes(&server).await;

    let pipeline = EnrichmentPipeline::new(&create_test_config(&server.uri()));
    let failure = pipeline.enrich(CNPJ).await.unwrap_err();

    assert_eq!(
        failure.error,
        EnrichmentError::IneligibleRecord {
            situacao: "BAIXADA".to_string()
        }
    );
    assert_eq!(failure.registry_raw, Some(registry_record("BAIXADA")));
}

#[tokio::test]
async fn test_cnes_failure_keeps_registry_data() {
    let server = MockServer::start().await;
    mount_registry(&server, 200, registry_record("ATIVA")).await;

    Mock::given(method("GET"))
        .and(path(CNES_PATH))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let pipeline = EnrichmentPipeline::new(&create_test_config(&server.uri()));
    let enriched = pipeline.enrich(CNPJ).await.unwrap();

    assert_eq!(enriched.profile.registry.cnpj, CNPJ);
    assert_eq!(enriched.profile.facility.cnes_codigo, None);
    assert_eq!(enriched.profile.facility.leitos_total, None);
    assert_eq!(enriched.profile.facility.dados_cnes_raw, None);
}

#[tokio::test]
async fn test_cnes_timeout_keeps_registry_data() {
    let server = MockServer::start().await;
    mount_registry(&server, 200, registry_record("ATIVA")).await;

    Mock::given(method("GET"))
        .and(path(CNES_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([cnes_record()]))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let config = create_test_config(&server.uri());
    let pipeline = EnrichmentPipeline::from_services(
        BrasilApiService::new(&config),
        CnesService::new(&config).with_timeout(Duration::from_millis(200)),
    );
    let enriched = pipeline.enrich(CNPJ).await.unwrap();

    assert_eq!(enriched.profile.facility.cnes_codigo, None);
    assert_eq!(
        enriched.profile.registry.nome_fantasia.as_deref(),
        Some("HOSPITAL SAO LUCAS")
    );
}

#[tokio::test]
async fn test_cnes_falls_back_to_trade_name() {
    let server = MockServer::start().await;
    mount_registry(&server, 200, registry_record("ATIVA")).await;

    Mock::given(method("GET"))
        .and(path(CNES_PATH))
        .and(query_param("cnpj", CNPJ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(CNES_PATH))
        .and(query_param("nome_fantasia", "HOSPITAL SAO LUCAS"))
        .and(query_param("uf", "PR"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([cnes_record()])))
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = EnrichmentPipeline::new(&create_test_config(&server.uri()));
    let enriched = pipeline.enrich(CNPJ).await.unwrap();

    assert_eq!(enriched.profile.facility.cnes_codigo.as_deref(), Some("2384299"));
}

#[tokio::test]
async fn test_cache_avoids_repeated_lookups() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(REGISTRY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(registry_record("ATIVA")))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(CNES_PATH))
        .and(query_param("cnpj", CNPJ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([cnes_record()])))
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = EnrichmentPipeline::new(&create_test_config(&server.uri()))
        .with_cache(ResponseCache::new());

    let first = pipeline.enrich(CNPJ).await.unwrap();
    let second = pipeline.enrich(CNPJ).await.unwrap();
    assert_eq!(first.profile, second.profile);
}

#[tokio::test]
async fn test_refresh_facility_bypasses_cache_and_reports_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(CNES_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(2)
        .mount(&server)
        .await;

    let cache = ResponseCache::new();
    cache.put_facility(CNPJ, &cnes_record()).await;
    let pipeline = EnrichmentPipeline::new(&create_test_config(&server.uri())).with_cache(cache);

    let identity = ProspectIdentity {
        cnpj: CNPJ.to_string(),
        context: CnesSearchContext {
            nome_fantasia: Some("HOSPITAL SAO LUCAS".to_string()),
            municipio: Some("CURITIBA".to_string()),
            uf: Some("PR".to_string()),
        },
    };
    let err = pipeline.refresh_facility(&identity).await.unwrap_err();

    assert!(matches!(err, EnrichmentError::NotFound(_)));
}

#[tokio::test]
async fn test_refresh_facility_returns_located_record() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(CNES_PATH))
        .and(query_param("cnpj", CNPJ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([cnes_record()])))
        .mount(&server)
        .await;

    let pipeline = EnrichmentPipeline::new(&create_test_config(&server.uri()));
    let identity = ProspectIdentity {
        cnpj: "11.222.333/0001-81".to_string(),
        context: CnesSearchContext::default(),
    };
    let facility = pipeline.refresh_facility(&identity).await.unwrap();

    assert_eq!(facility.tipo_estabelecimento.as_deref(), Some("HOSPITAL GERAL"));
    assert_eq!(facility.leitos_total, Some(210));
}

// ============ LLM ============

fn chat_response(content: &str) -> Value {
    json!({
        "choices": [{"message": {"role": "assistant", "content": content}}],
        "usage": {"prompt_tokens": 100, "completion_tokens": 50}
    })
}

fn interaction_context() -> InteractionContext {
    InteractionContext {
        prospect_nome: "Hospital São Lucas".to_string(),
        prospect_porte: Some("DEMAIS".to_string()),
        prospect_tipo: Some("HOSPITAL GERAL".to_string()),
        prospect_status: Some("contatado".to_string()),
        tipo_interacao: InteractionType::Reuniao,
        resumo: "Reunião com o diretor financeiro".to_string(),
        detalhes: None,
        historico: vec!["[email] Apresentação enviada".to_string()],
    }
}

#[tokio::test]
async fn test_analyze_interaction_parses_json() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_response(
            r#"{"proximos_passos": "Enviar proposta até sexta", "sentimento": "positivo"}"#,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let llm = LlmClient::new(server.uri(), "test-key".to_string(), "test-model".to_string());
    let analysis = ai::analyze_interaction(&llm, &interaction_context())
        .await
        .unwrap();

    assert_eq!(analysis.proximos_passos, "Enviar proposta até sexta");
    assert_eq!(analysis.sentimento, "positivo");
}

#[tokio::test]
async fn test_analyze_interaction_api_error_is_returned() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let llm = LlmClient::new(server.uri(), "test-key".to_string(), "test-model".to_string());
    let err = ai::analyze_interaction(&llm, &interaction_context())
        .await
        .unwrap_err();

    assert!(matches!(err, LlmError::Api { status: 500, .. }));
}

#[tokio::test]
async fn test_outreach_messages_from_fenced_json() {
    let server = MockServer::start().await;
    let content = "```json\n{\"linkedin_conexao\": \"Olá!\", \"email_introducao\": \"Assunto: BI\", \
                   \"roteiro_ligacao\": \"Abertura\", \"whatsapp\": \"Oi\", \
                   \"email_followup\": \"Retomando\"}\n```";
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_response(content)))
        .mount(&server)
        .await;

    let llm = LlmClient::new(server.uri(), "test-key".to_string(), "test-model".to_string());
    let context = ai::BriefingContext {
        nome_instituicao: "Hospital São Lucas".to_string(),
        razao_social: None,
        porte: None,
        capital_social: None,
        natureza_juridica: None,
        atividade_principal: None,
        municipio: None,
        uf: None,
        socios: vec![],
        tipo_estabelecimento: None,
        leitos_total: None,
        leitos_sus: None,
        leitos_nao_sus: None,
        sistema_gestao: None,
        segmento: health_sales_ai::segmentation::Segment::Outro,
        decisor_nome: None,
        decisor_cargo: None,
        stakeholders: vec![],
        interacoes_anteriores: vec![],
    };
    let messages = ai::generate_outreach_messages(&llm, &context).await.unwrap();

    assert_eq!(messages.linkedin_conexao, "Olá!");
    assert_eq!(messages.email_followup, "Retomando");
}

// ============ HTTP ============

async fn test_router(config: Config) -> Router {
    let pool = PgPoolOptions::new()
        .connect_lazy(&config.database_url)
        .unwrap();
    let state = Arc::new(AppState {
        storage: ProspectStorage::new(pool),
        pipeline: EnrichmentPipeline::new(&config),
        llm: None,
        config,
    });
    Router::new().merge(api::routes()).with_state(state)
}

fn enrich_request(cnpj: &str, user: Option<Uuid>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/v1/enrich")
        .header("content-type", "application/json");
    if let Some(user) = user {
        builder = builder.header("X-User-Id", user.to_string());
    }
    builder
        .body(Body::from(json!({ "cnpj": cnpj }).to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_enrich_endpoint_requires_user() {
    let server = MockServer::start().await;
    let app = test_router(create_test_config(&server.uri())).await;

    let response = app.oneshot(enrich_request(CNPJ, None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_enrich_endpoint_maps_failures_to_status() {
    let server = MockServer::start().await;
    mount_registry(&server, 200, registry_record("INAPTA")).await;
    let app = test_router(create_test_config(&server.uri())).await;

    let response = app
        .clone()
        .oneshot(enrich_request("123", Some(Uuid::new_v4())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error_code"], "invalid_input");

    let response = app
        .oneshot(enrich_request(CNPJ, Some(Uuid::new_v4())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["error_code"], "ineligible_record");
    assert_eq!(body["brasil_api_raw"], registry_record("INAPTA"));
}

#[tokio::test]
async fn test_enrich_endpoint_success() {
    let server = MockServer::start().await;
    mount_registry(&server, 200, registry_record("ATIVA")).await;
    Mock::given(method("GET"))
        .and(path(CNES_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([cnes_record()])))
        .mount(&server)
        .await;
    let app = test_router(create_test_config(&server.uri())).await;

    let response = app
        .oneshot(enrich_request("11.222.333/0001-81", Some(Uuid::new_v4())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["prospect"]["cnpj"], CNPJ);
    assert_eq!(body["prospect"]["leitos_total"], 210);
    assert_eq!(body["prospect"]["segmento"], "hospital_grande");
}
