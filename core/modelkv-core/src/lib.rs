//! # modelkv: Schema-driven Resource Store
//!
//! modelkv는 선언적 모델 정의를 키-값 저장소의 물리 테이블로 매핑하는 스토리지 코어입니다.
//! 모델 하나당 테이블 하나, 행 크기 예산을 넘는 리소스는 오버플로 저장소로 분리됩니다.
//!
//! ## 주요 특징
//!
//! - **Schema Translator**: Model → TableDefinition (keys, indexes, attribute types)
//! - **Overflow Codec**: greedy minify under a row budget, inflate on read
//! - **Table Gateway**: get/create/update/destroy with single-flight table creation
//! - **Query Planner**: index query vs. scan, residual filters, native or in-memory ordering
//! - **Backends**: in-memory (DashMap) and persistent (sled)
//!
//! ## 빠른 시작
//!
//! ```rust
//! use modelkv_core::{Engine, EngineConfig, ListArgs, Model, ModelRegistry, OrderBy, Property, Resource};
//! use modelkv_core::query::Filter;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> modelkv_core::MkvResult<()> {
//! let models = ModelRegistry::new(vec![
//!     Model::new("acme.Note")
//!         .property("body", Property::string())
//!         .required("body"),
//! ])?;
//! let engine = Engine::in_memory(models, EngineConfig::default())?;
//!
//! // 쓰기: 테이블은 첫 접근 시 자동 생성
//! let notes = engine.table("acme.Note")?;
//! for (link, time) in [("L1", 1), ("L2", 2)] {
//!     notes
//!         .create(
//!             Resource::new()
//!                 .with("link", link)
//!                 .with("author", "bob")
//!                 .with("time", time)
//!                 .with("body", "hi"),
//!         )
//!         .await?;
//! }
//!
//! // 조회: author EQ → AuthorAndDateIndex 쿼리, time 역순
//! let args = ListArgs::new()
//!     .filter(Filter::new().eq("author", "bob"))
//!     .order_by(OrderBy::desc("time"));
//! let latest = engine.resolvers().list("acme.Note", &args).await?;
//! assert_eq!(latest[0].link(), Some("L2"));
//! # Ok(())
//! # }
//! ```
//!
//! ## 아키텍처
//!
//! ```text
//! ModelRegistry → SchemaCache → TableDefinition
//! Resolvers → TableCatalog → TableGateway ─┬─ KvBackend   (rows)
//!                      │                   └─ ObjectStore (overflow)
//!                      └ plan() → ExecutionPlan → Cursor
//! ```
//!
//! ## 모듈 구조
//!
//! - [`model`]: 모델 정의, 레지스트리, introspection
//! - [`schema`]: 테이블 정의와 변환기
//! - [`overflow`]: minify / inflate
//! - [`storage`]: 백엔드 트레잇과 구현
//! - [`engine`]: 카탈로그, 게이트웨이, 커서
//! - [`query`]: 필터, 플래너, 실행기
//! - [`resolver`]: get / list / update

pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod overflow;
pub mod query;
pub mod resolver;
pub mod resource;
pub mod schema;
pub mod storage;

// Logging utilities
pub mod logging;

// ===== Re-exports =====
pub use config::{EngineConfig, OverflowWrite};
pub use engine::{Engine, TableCatalog, TableGateway};
pub use error::{MkvError, MkvResult};
pub use model::{Model, ModelRegistry, Property, PropertyType};
pub use query::{Filter, OrderBy};
pub use resolver::{ListArgs, Resolvers};
pub use resource::Resource;
pub use schema::{Key, TableDefinition};
pub use storage::{KvBackend, MemoryBackend, MemoryObjectStore, ObjectStore, SledBackend, SledObjectStore};
