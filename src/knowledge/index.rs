//! Flat Index - 정확한 L2 최근접 이웃 검색
//!
//! 세션 하나가 가진 청크 수는 수백 개 수준이므로 ANN 대신
//! 전수 비교(brute force)로 정확한 결과를 반환합니다.

use std::cmp::Ordering;

use anyhow::Result;

// ============================================================================
// Types
// ============================================================================

/// 검색된 이웃
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// 벡터 ID (삽입 순서, 0-based)
    pub id: usize,
    /// 제곱 L2 거리
    pub distance: f32,
}

/// 평면(flat) L2 인덱스
///
/// 모든 벡터를 하나의 연속 버퍼에 저장합니다.
/// 차원은 첫 벡터가 들어올 때가 아니라 생성 시 고정됩니다.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    /// 차원을 지정하여 빈 인덱스 생성
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    /// 벡터 배치 추가
    ///
    /// 하나라도 차원이 다르면 아무것도 추가하지 않고 에러를 반환합니다.
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        if let Some((i, bad)) = vectors
            .iter()
            .enumerate()
            .find(|(_, v)| v.len() != self.dimension)
        {
            anyhow::bail!(
                "Embedding dimension mismatch at vector {}: expected {}, got {}",
                i,
                self.dimension,
                bad.len()
            );
        }

        self.data.reserve(vectors.len() * self.dimension);
        for vector in vectors {
            self.data.extend_from_slice(vector);
        }
        Ok(())
    }

    /// k개 최근접 이웃 검색
    ///
    /// `k`는 저장된 벡터 수로 제한됩니다. 결과는 거리 오름차순이며,
    /// 거리가 같으면 ID가 작은 쪽이 먼저 옵니다.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if query.len() != self.dimension {
            anyhow::bail!(
                "Query dimension mismatch: expected {}, got {}",
                self.dimension,
                query.len()
            );
        }

        let k = k.min(self.len());
        if k == 0 {
            return Ok(vec![]);
        }

        let mut neighbors: Vec<Neighbor> = self
            .vectors()
            .enumerate()
            .map(|(id, v)| Neighbor {
                id,
                distance: l2_distance_squared(query, v),
            })
            .collect();

        neighbors.sort_by(|a, b| match a.distance.total_cmp(&b.distance) {
            Ordering::Equal => a.id.cmp(&b.id),
            ord => ord,
        });
        neighbors.truncate(k);

        Ok(neighbors)
    }

    /// 저장된 벡터 수
    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn vectors(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.dimension.max(1))
    }
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 제곱 유클리드 거리
///
/// 순위만 필요하므로 제곱근은 생략합니다.
pub fn l2_distance_squared(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

// ============================================================================
// Tests
// ============================================================================
