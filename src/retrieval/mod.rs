//! 检索协作方：query(text, user_scope, top_k) -> 按相关度排序的片段 + 来源
//!
//! 编排器只依赖 Retriever trait；向量索引等真实存储在外部实现。
//! 这里提供 InMemoryRetriever（关键词重叠，按用户作用域过滤）与 NoopRetriever。

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// 对所有用户可见的作用域
pub const PUBLIC_SCOPE: &str = "*";

/// 一条检索结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedSnippet {
    pub snippet: String,
    pub source_citation: String,
    pub score: f32,
    /// 结构化字段（name / lat / lon / duration_min / cost / currency / category / opens / closes / media）
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// 检索协作方：必须按用户作用域过滤；没有匹配时返回空列表而不是错误
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn query(
        &self,
        text: &str,
        user_scope: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedSnippet>, String>;
}

/// 空实现：未接入知识库时使用
#[derive(Clone, Default)]
pub struct NoopRetriever;

#[async_trait]
impl Retriever for NoopRetriever {
    async fn query(&self, _text: &str, _user_scope: &str, _top_k: usize) -> Result<Vec<RetrievedSnippet>, String> {
        Ok(Vec::new())
    }
}

/// 知识库文件中的一条文档
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeDocument {
    /// 所属用户；缺省为公共
    #[serde(default = "default_scope")]
    pub scope: String,
    pub snippet: String,
    pub source: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

fn default_scope() -> String {
    PUBLIC_SCOPE.to_string()
}

struct IndexedDoc {
    doc: KnowledgeDocument,
    tokens: HashSet<String>,
}

/// 简单内存实现：按关键词重叠检索（无真实向量）
#[derive(Clone, Default)]
pub struct InMemoryRetriever {
    store: Arc<RwLock<Vec<IndexedDoc>>>,
}

/// 将文本切分为小写词集合，去掉标点与单字符词
fn tokenize_lower(s: &str) -> HashSet<String> {
    s.split(|c: char| !c.is_alphanumeric())
        .map(|w| w.to_lowercase())
        .filter(|w| w.chars().count() > 1)
        .collect()
}

impl InMemoryRetriever {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, doc: KnowledgeDocument) {
        // 元数据里的名字与类别也参与匹配
        let mut text = doc.snippet.clone();
        for key in ["name", "category", "city"] {
            if let Some(v) = doc.metadata.get(key) {
                text.push(' ');
                text.push_str(v);
            }
        }
        let tokens = tokenize_lower(&text);
        let mut store = self.store.write().unwrap_or_else(|e| e.into_inner());
        store.push(IndexedDoc { doc, tokens });
    }

    /// 添加一条公共文档
    pub fn add_public(&self, snippet: impl Into<String>, source: impl Into<String>) {
        self.add(KnowledgeDocument {
            scope: PUBLIC_SCOPE.to_string(),
            snippet: snippet.into(),
            source: source.into(),
            metadata: BTreeMap::new(),
        });
    }

    /// 从 JSON 文件（KnowledgeDocument 数组）加载
    pub fn load_json(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let docs: Vec<KnowledgeDocument> = serde_json::from_str(&data)?;
        let retriever = Self::new();
        for doc in docs {
            retriever.add(doc);
        }
        Ok(retriever)
    }

    pub fn len(&self) -> usize {
        self.store.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Retriever for InMemoryRetriever {
    async fn query(&self, text: &str, user_scope: &str, top_k: usize) -> Result<Vec<RetrievedSnippet>, String> {
        let query_tokens = tokenize_lower(text);
        if query_tokens.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }
        let store = self.store.read().map_err(|_| "retrieval index poisoned".to_string())?;
        let q = query_tokens.len() as f32;
        // (score, 插入序号) 排序：分数降序，同分保持插入顺序
        let mut scored: Vec<(f32, usize, &KnowledgeDocument)> = store
            .iter()
            .enumerate()
            .filter(|(_, d)| d.doc.scope == PUBLIC_SCOPE || d.doc.scope == user_scope)
            .map(|(i, d)| (d.tokens.intersection(&query_tokens).count() as f32 / q, i, &d.doc))
            .filter(|(s, _, _)| *s > 0.0)
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(score, _, doc)| RetrievedSnippet {
                snippet: doc.snippet.clone(),
                source_citation: doc.source.clone(),
                score,
                metadata: doc.metadata.clone(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_query_filters_by_user_scope() {
        let r = InMemoryRetriever::new();
        r.add_public("Barcelona beach day at Barceloneta", "public-1");
        r.add(KnowledgeDocument {
            scope: "alice".to_string(),
            snippet: "Alice's private Barcelona tapas list".to_string(),
            source: "alice-notes".to_string(),
            metadata: BTreeMap::new(),
        });

        let bob = r.query("Barcelona tapas", "bob", 5).await.unwrap();
        assert_eq!(bob.len(), 1);
        assert_eq!(bob[0].source_citation, "public-1");

        let alice = r.query("Barcelona tapas", "alice", 5).await.unwrap();
        assert_eq!(alice.len(), 2);
        assert_eq!(alice[0].source_citation, "alice-notes");
    }

    #[tokio::test]
    async fn test_no_match_returns_empty_not_error() {
        let r = InMemoryRetriever::new();
        r.add_public("Kyoto temples", "k1");
        assert!(r.query("Lisbon trams", "anyone", 3).await.unwrap().is_empty());
        assert!(NoopRetriever.query("x y", "anyone", 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_top_k_and_metadata_tokens() {
        let r = InMemoryRetriever::new();
        let mut meta = BTreeMap::new();
        meta.insert("name".to_string(), "Sagrada Familia".to_string());
        r.add(KnowledgeDocument {
            scope: PUBLIC_SCOPE.to_string(),
            snippet: "Gaudi basilica, book ahead".to_string(),
            source: "s1".to_string(),
            metadata: meta,
        });
        r.add_public("Familia friendly parks", "s2");
        let hits = r.query("sagrada familia", "u", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source_citation, "s1");
        assert_eq!(hits[0].metadata["name"], "Sagrada Familia");
    }
}
