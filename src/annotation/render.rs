//! Rasterization of polygon annotations into label images.

use std::str::FromStr;

use image::{ImageBuffer, Luma};
use imageproc::drawing::{draw_line_segment_mut, draw_polygon_mut};
use imageproc::point::Point as PixelPoint;
use ndarray::Array2;

use crate::dataset::Labels;
use crate::error::AnnotationError;

/// Shape of an annotation as drawn in the annotation tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationKind {
    Dot,
    Polygon,
    Spline,
    Rectangle,
}

impl FromStr for AnnotationKind {
    type Err = AnnotationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Dot" => Ok(AnnotationKind::Dot),
            "Polygon" => Ok(AnnotationKind::Polygon),
            "Spline" => Ok(AnnotationKind::Spline),
            "Rectangle" => Ok(AnnotationKind::Rectangle),
            other => Err(AnnotationError::UnknownType(other.to_string())),
        }
    }
}

/// One labelled shape with vertices in level 0 pixel coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub name: String,
    pub kind: AnnotationKind,
    pub label: String,
    pub vertices: Vec<(f64, f64)>,
}

impl Annotation {
    pub fn new(
        name: impl Into<String>,
        kind: AnnotationKind,
        label: impl Into<String>,
        vertices: Vec<(f64, f64)>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            label: label.into(),
            vertices,
        }
    }

    /// Fill the shape into `canvas` with `value`, dividing every vertex by
    /// `factor` first.
    fn draw(&self, canvas: &mut LabelCanvas, value: u32, factor: f64) {
        let mut points: Vec<PixelPoint<i32>> = Vec::with_capacity(self.vertices.len());
        for &(x, y) in &self.vertices {
            let point = PixelPoint::new((x / factor) as i32, (y / factor) as i32);
            if points.last() != Some(&point) {
                points.push(point);
            }
        }
        while points.len() > 1 && points.first() == points.last() {
            points.pop();
        }

        let color = Luma([value]);
        match points.as_slice() {
            [] => {}
            [p] => {
                if p.x >= 0
                    && p.y >= 0
                    && (p.x as u32) < canvas.width()
                    && (p.y as u32) < canvas.height()
                {
                    canvas.put_pixel(p.x as u32, p.y as u32, color);
                }
            }
            [a, b] => draw_line_segment_mut(
                canvas,
                (a.x as f32, a.y as f32),
                (b.x as f32, b.y as f32),
                color,
            ),
            polygon => draw_polygon_mut(canvas, polygon, color),
        }
    }
}

type LabelCanvas = ImageBuffer<Luma<u32>, Vec<u32>>;

/// The annotations of one slide plus the rules for turning them into labels.
///
/// Rendering starts from a raster filled with `fill_label` and paints
/// annotations in `labels_order`, so later labels in that order overwrite
/// earlier ones where shapes overlap.
#[derive(Debug, Clone)]
pub struct AnnotationSet {
    annotations: Vec<Annotation>,
    labels: Labels,
    labels_order: Vec<String>,
    fill_label: String,
}

impl AnnotationSet {
    pub fn new(
        annotations: Vec<Annotation>,
        labels: Labels,
        labels_order: Vec<String>,
        fill_label: impl Into<String>,
    ) -> Self {
        Self {
            annotations,
            labels,
            labels_order,
            fill_label: fill_label.into(),
        }
    }

    /// Annotation set with no shapes: renders as a uniform `fill_label` raster.
    pub fn empty(labels: Labels, labels_order: Vec<String>, fill_label: impl Into<String>) -> Self {
        Self::new(Vec::new(), labels, labels_order, fill_label)
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    /// Render to a label raster of `shape` (`(rows, cols)`), dividing vertex
    /// coordinates by `factor`.
    pub fn render(&self, shape: (usize, usize), factor: f64) -> Result<Array2<u32>, AnnotationError> {
        let fill = self
            .labels
            .index(&self.fill_label)
            .ok_or_else(|| AnnotationError::UnknownLabel(self.fill_label.clone()))?;

        let mut ordered = Vec::with_capacity(self.annotations.len());
        for annotation in &self.annotations {
            let rank = self
                .labels_order
                .iter()
                .position(|l| l == &annotation.label)
                .ok_or_else(|| AnnotationError::UnknownLabel(annotation.label.clone()))?;
            let value = self
                .labels
                .index(&annotation.label)
                .ok_or_else(|| AnnotationError::UnknownLabel(annotation.label.clone()))?;
            ordered.push((rank, value, annotation));
        }
        ordered.sort_by_key(|(rank, _, _)| *rank);

        let (rows, cols) = shape;
        let mut canvas = LabelCanvas::from_pixel(cols as u32, rows as u32, Luma([fill]));
        for (_, value, annotation) in ordered {
            annotation.draw(&mut canvas, value, factor);
        }

        Ok(Array2::from_shape_fn(shape, |(row, col)| {
            canvas.get_pixel(col as u32, row as u32)[0]
        }))
    }
}
