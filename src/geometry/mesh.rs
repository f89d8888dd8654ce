use std::path::Path;

use log::{info, warn};

use super::kd_tree::{KdNode, KdStats};
use super::{Intersectable, IntersectionInfo};
use crate::bbox::BBox;
use crate::math::{Ray, Vec3};

/// A single triangle of a [`Mesh`], holding indices into the vertex, normal
/// and uv pools plus precomputed intersection data.
#[derive(Copy, Clone, Debug, Default)]
pub struct Triangle {
    pub v: [usize; 3],
    pub n: [usize; 3],
    pub t: [usize; 3],
    /// Geometric normal, `AB x AC` normalized.
    pub gnormal: Vec3,
    pub ab: Vec3,
    pub ac: Vec3,
    /// Normal differentials in texture space.
    pub dn_dx: Vec3,
    pub dn_dy: Vec3,
}

/// An indexed triangle mesh with a k-d tree spatial index. The zeroth
/// element of each attribute pool is a sentinel so OBJ's 1-based indices
/// map directly.
pub struct Mesh {
    pub vertices: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub uvs: Vec<Vec3>,
    pub triangles: Vec<Triangle>,
    pub faceted: bool,
    pub backface_culling: bool,
    pub auto_smooth: bool,
    pub use_kd_tree: bool,
    bbox: BBox,
    kd_root: Option<KdNode>,
}

impl Mesh {
    pub fn new() -> Self {
        let sentinel = Vec3::zeros();
        Self {
            vertices: vec![sentinel],
            normals: vec![sentinel],
            uvs: vec![sentinel],
            triangles: Vec::new(),
            faceted: false,
            backface_culling: false,
            auto_smooth: false,
            use_kd_tree: true,
            bbox: BBox::new_empty(),
            kd_root: None,
        }
    }

    /// Loads a Wavefront OBJ file. Faces with more than three vertices are
    /// fan-triangulated. Returns `Err` when the file cannot be read; the
    /// returned mesh must still go through [`Mesh::begin_render`] before use.
    pub fn load_obj(path: &Path) -> crate::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut mesh = Self::parse_obj(&text);
        info!(
            "loaded {}: {} triangles",
            path.display(),
            mesh.triangles.len()
        );
        mesh.prepare_triangles();
        Ok(mesh)
    }

    fn parse_obj(text: &str) -> Self {
        let mut mesh = Self::new();
        for line in text.lines() {
            let mut tokens = line.split_whitespace();
            let Some(tag) = tokens.next() else { continue };
            let tokens: Vec<&str> = tokens.collect();
            let coord = |s: Option<&&str>| s.and_then(|t| t.parse::<f64>().ok()).unwrap_or(0.0);
            match tag {
                "v" => mesh.vertices.push(Vec3::new(
                    coord(tokens.first()),
                    coord(tokens.get(1)),
                    coord(tokens.get(2)),
                )),
                "vn" => mesh.normals.push(Vec3::new(
                    coord(tokens.first()),
                    coord(tokens.get(1)),
                    coord(tokens.get(2)),
                )),
                "vt" => mesh.uvs.push(Vec3::new(
                    coord(tokens.first()),
                    coord(tokens.get(1)),
                    0.0,
                )),
                "f" if tokens.len() >= 3 => {
                    for i in 0..tokens.len() - 2 {
                        mesh.triangles
                            .push(parse_triangle(tokens[0], tokens[1 + i], tokens[2 + i]));
                    }
                }
                _ => (),
            }
        }
        mesh
    }

    /// Precomputes per-triangle edges, geometric normals and texture-space
    /// differentials.
    pub fn prepare_triangles(&mut self) {
        if self.normals.len() <= 1 {
            self.faceted = true;
        }
        for t in &mut self.triangles {
            let a = self.vertices[t.v[0]];
            let b = self.vertices[t.v[1]];
            let c = self.vertices[t.v[2]];
            t.ab = b - a;
            t.ac = c - a;
            t.gnormal = t.ab.cross(t.ac).normalized();

            let ta = self.uvs[t.t[0]];
            let tb = self.uvs[t.t[1]];
            let tc = self.uvs[t.t[2]];
            let tex_ab = tb - ta;
            let tex_ac = tc - ta;
            // Express the texture-space basis in object space; meshes
            // without uvs get zero differentials
            if let (Some((px, qx)), Some((py, qy))) = (
                solve_2d(tex_ab, tex_ac, Vec3::new(1.0, 0.0, 0.0)),
                solve_2d(tex_ab, tex_ac, Vec3::new(0.0, 1.0, 0.0)),
            ) {
                t.dn_dx = (t.ab * px + t.ac * qx).normalized();
                t.dn_dy = (t.ab * py + t.ac * qy).normalized();
            }
        }
    }

    /// Builds the spatial index and synthesizes smooth normals if requested.
    /// Must be called once, before the mesh is used for rendering.
    pub fn begin_render(&mut self) {
        self.bbox = BBox::new_empty();
        for v in self.vertices.iter().skip(1) {
            self.bbox.add(*v);
        }
        if self.use_kd_tree && self.kd_root.is_none() {
            let mut stats = KdStats::default();
            let indices: Vec<u32> = (0..self.triangles.len() as u32).collect();
            let triangles = &self.triangles;
            let vertices = &self.vertices;
            let corners = |idx: u32| {
                let t = &triangles[idx as usize];
                (vertices[t.v[0]], vertices[t.v[1]], vertices[t.v[2]])
            };
            self.kd_root = Some(KdNode::build(&self.bbox, indices, 0, &corners, &mut stats));
            stats.log();
        }
        if self.normals.len() <= 1 && self.auto_smooth {
            self.normals = vec![Vec3::zeros(); self.vertices.len()];
            for i in 0..self.triangles.len() {
                for j in 0..3 {
                    let t = &mut self.triangles[i];
                    t.n[j] = t.v[j];
                }
                let gnormal = self.triangles[i].gnormal;
                for j in 0..3 {
                    let n_idx = self.triangles[i].n[j];
                    self.normals[n_idx] += gnormal;
                }
            }
            for n in self.normals.iter_mut().skip(1) {
                if n.length_sqr() > 1e-9 {
                    *n = n.normalized();
                }
            }
            self.faceted = false;
        }
        // Smooth shading without normals has to fall back to faceted
        if self.normals.len() <= 1 && !self.faceted {
            warn!("mesh has no normals, reverting to faceted shading");
            self.faceted = true;
        }
    }

    pub fn bbox(&self) -> &BBox {
        &self.bbox
    }

    /// Ray/triangle test via Cramer's rule on the precomputed edge vectors.
    fn intersect_triangle(&self, ray: &Ray, t: &Triangle) -> Option<IntersectionInfo> {
        if self.backface_culling && ray.dir.dot(t.gnormal) > 0.0 {
            return None;
        }
        let a = self.vertices[t.v[0]];
        let ab = t.ab;
        let ac = t.ac;
        let h = ray.start - a;
        let neg_dir = -ray.dir;
        let dcr = det(ab, ac, neg_dir);
        if dcr.abs() < 1e-12 {
            // Ray parallel to the triangle plane
            return None;
        }
        let r_dcr = 1.0 / dcr;
        let lambda2 = det(h, ac, neg_dir) * r_dcr;
        if !(0.0..=1.0).contains(&lambda2) {
            return None;
        }
        let lambda3 = det(ab, h, neg_dir) * r_dcr;
        if !(0.0..=1.0).contains(&lambda3) {
            return None;
        }
        let lambda1 = 1.0 - (lambda2 + lambda3);
        if !(0.0..=1.0).contains(&lambda1) {
            return None;
        }
        let gamma = det(ab, ac, h) * r_dcr;
        if gamma < 0.0 {
            return None;
        }

        let mut info = IntersectionInfo::new();
        info.dist = gamma;
        info.ip = ray.point(gamma);

        let ta = self.uvs[t.t[0]];
        let tb = self.uvs[t.t[1]];
        let tc = self.uvs[t.t[2]];
        let tex = ta + (tb - ta) * lambda2 + (tc - ta) * lambda3;
        info.u = tex.x;
        info.v = tex.y;

        info.norm = if self.faceted {
            t.gnormal
        } else {
            let na = self.normals[t.n[0]];
            let nb = self.normals[t.n[1]];
            let nc = self.normals[t.n[2]];
            (na + (nb - na) * lambda2 + (nc - na) * lambda3).normalized()
        };
        info.dn_dx = t.dn_dx;
        info.dn_dy = t.dn_dy;
        Some(info)
    }

    /// Near-child-first traversal: because a leaf reports the nearest hit
    /// inside its own box, a hit in the near child is closer than anything
    /// the far child could produce, so the far subtree is skipped.
    fn intersect_kd(
        &self,
        node: &KdNode,
        bbox: &BBox,
        ray: &Ray,
        info: &mut IntersectionInfo,
    ) -> bool {
        match node {
            KdNode::Leaf(triangles) => {
                let mut found = false;
                for &idx in triangles {
                    if let Some(candidate) = self.intersect_triangle(ray, &self.triangles[idx as usize])
                    {
                        // Triangles straddle leaves; only accept hit points
                        // inside this leaf's own box to avoid false
                        // boundary hits
                        if candidate.dist < info.dist && bbox.inside(candidate.ip) {
                            *info = candidate;
                            found = true;
                        }
                    }
                }
                found
            }
            KdNode::Split {
                axis,
                pos,
                children,
            } => {
                let (left_box, right_box) = bbox.split(*axis, *pos);
                let child_boxes = [left_box, right_box];
                let mut order = [0usize, 1];
                if ray.start[*axis] > *pos {
                    order.swap(0, 1);
                }
                for side in order {
                    if child_boxes[side].test_intersect(ray)
                        && self.intersect_kd(&children[side], &child_boxes[side], ray, info)
                    {
                        return true;
                    }
                }
                false
            }
        }
    }
}

impl Default for Mesh {
    fn default() -> Self {
        Self::new()
    }
}

impl Intersectable for Mesh {
    fn intersect(&self, ray: &Ray, info: &mut IntersectionInfo) -> bool {
        if !self.bbox.test_intersect(ray) {
            return false;
        }
        if let Some(root) = &self.kd_root {
            self.intersect_kd(root, &self.bbox, ray, info)
        } else {
            let mut found = false;
            for t in &self.triangles {
                if let Some(candidate) = self.intersect_triangle(ray, t) {
                    if candidate.dist < info.dist {
                        *info = candidate;
                        found = true;
                    }
                }
            }
            found
        }
    }
}

fn det(a: Vec3, b: Vec3, c: Vec3) -> f64 {
    a.cross(b).dot(c)
}

/// Solves `x * a + y * b = c` in the xy plane.
fn solve_2d(a: Vec3, b: Vec3, c: Vec3) -> Option<(f64, f64)> {
    let dcr = a.x * b.y - b.x * a.y;
    if dcr.abs() < 1e-12 {
        return None;
    }
    let x = (c.x * b.y - c.y * b.x) / dcr;
    let y = (a.x * c.y - a.y * c.x) / dcr;
    Some((x, y))
}

/// Parses one OBJ face corner, "v", "v/t", "v//n" or "v/t/n".
fn parse_trio(s: &str) -> (usize, usize, usize) {
    let mut items = s.split('/');
    let index = |s: Option<&str>| {
        s.and_then(|t| if t.is_empty() { None } else { t.parse::<usize>().ok() })
            .unwrap_or(0)
    };
    let v = index(items.next());
    let t = index(items.next());
    let n = index(items.next());
    (v, t, n)
}

fn parse_triangle(s0: &str, s1: &str, s2: &str) -> Triangle {
    let mut triangle = Triangle::default();
    for (i, s) in [s0, s1, s2].iter().enumerate() {
        let (v, t, n) = parse_trio(s);
        triangle.v[i] = v;
        triangle.t[i] = t;
        triangle.n[i] = n;
    }
    triangle
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::Rng;
    use rand_pcg::Pcg32;

    /// A bumpy heightfield grid, enough triangles to force several splits.
    fn grid_mesh(n: usize) -> Mesh {
        let mut mesh = Mesh::new();
        for j in 0..=n {
            for i in 0..=n {
                let x = i as f64 / n as f64 * 10.0 - 5.0;
                let z = j as f64 / n as f64 * 10.0 - 5.0;
                let y = (x * 1.3).sin() * (z * 0.7).cos();
                mesh.vertices.push(Vec3::new(x, y, z));
            }
        }
        let at = |i: usize, j: usize| 1 + j * (n + 1) + i;
        for j in 0..n {
            for i in 0..n {
                for (a, b, c) in [
                    (at(i, j), at(i + 1, j), at(i + 1, j + 1)),
                    (at(i, j), at(i + 1, j + 1), at(i, j + 1)),
                ] {
                    let mut t = Triangle::default();
                    t.v = [a, b, c];
                    t.t = [0, 0, 0];
                    t.n = [0, 0, 0];
                    mesh.triangles.push(t);
                }
            }
        }
        mesh.prepare_triangles();
        mesh
    }

    #[test]
    fn kd_tree_matches_brute_force() {
        let mut with_tree = grid_mesh(12);
        with_tree.use_kd_tree = true;
        with_tree.begin_render();

        let mut brute = grid_mesh(12);
        brute.use_kd_tree = false;
        brute.begin_render();

        let mut rng = Pcg32::new(0xdead_beef, 0);
        for _ in 0..256 {
            let start = Vec3::new(
                rng.gen_range(-6.0..6.0),
                rng.gen_range(3.0..6.0),
                rng.gen_range(-6.0..6.0),
            );
            let target = Vec3::new(
                rng.gen_range(-5.0..5.0),
                rng.gen_range(-1.5..1.5),
                rng.gen_range(-5.0..5.0),
            );
            let ray = Ray::new(start, (target - start).normalized());

            let mut info_tree = IntersectionInfo::new();
            let hit_tree = with_tree.intersect(&ray, &mut info_tree);
            let mut info_brute = IntersectionInfo::new();
            let hit_brute = brute.intersect(&ray, &mut info_brute);

            assert_eq!(hit_tree, hit_brute, "ray {:?}", ray);
            if hit_tree {
                assert_abs_diff_eq!(info_tree.dist, info_brute.dist, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn auto_smooth_fills_vertex_normals() {
        let mut mesh = grid_mesh(4);
        mesh.auto_smooth = true;
        assert!(mesh.faceted);
        mesh.begin_render();
        assert!(!mesh.faceted);
        assert_eq!(mesh.normals.len(), mesh.vertices.len());
        // Interior vertex normals average adjoining faces and are unit
        let n = mesh.normals[mesh.normals.len() / 2];
        assert_abs_diff_eq!(n.length(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn backface_culling_rejects_from_behind() {
        let mut mesh = Mesh::new();
        mesh.vertices.push(Vec3::new(-1.0, 0.0, -1.0));
        mesh.vertices.push(Vec3::new(1.0, 0.0, -1.0));
        mesh.vertices.push(Vec3::new(0.0, 0.0, 1.0));
        let mut t = Triangle::default();
        t.v = [1, 2, 3];
        mesh.triangles.push(t);
        mesh.prepare_triangles();
        mesh.use_kd_tree = false;
        mesh.begin_render();

        let from_above = Ray::new(Vec3::new(0.0, 2.0, 0.0), Vec3::new(0.0, -1.0, 0.0));
        let from_below = Ray::new(Vec3::new(0.0, -2.0, 0.0), Vec3::new(0.0, 1.0, 0.0));

        let mut info = IntersectionInfo::new();
        let above_hits = mesh.intersect(&from_above, &mut info);
        let mut info = IntersectionInfo::new();
        let below_hits = mesh.intersect(&from_below, &mut info);
        assert!(above_hits && below_hits);

        mesh.backface_culling = true;
        let mut info = IntersectionInfo::new();
        let front = mesh.intersect(&from_above, &mut info);
        let mut info = IntersectionInfo::new();
        let back = mesh.intersect(&from_below, &mut info);
        assert!(front != back, "culling must reject exactly one side");
    }

    #[test]
    fn obj_parsing_fan_triangulates() {
        let obj = "\
# quad on the xz plane
v 0 0 0
v 1 0 0
v 1 0 1
v 0 0 1
vt 0 0
vt 1 0
vt 1 1
vt 0 1
f 1/1 2/2 3/3 4/4
";
        let mut mesh = Mesh::parse_obj(obj);
        assert_eq!(mesh.vertices.len(), 5); // sentinel + 4
        assert_eq!(mesh.triangles.len(), 2); // fan of the quad
        assert_eq!(mesh.triangles[0].v, [1, 2, 3]);
        assert_eq!(mesh.triangles[1].v, [1, 3, 4]);
        assert_eq!(mesh.triangles[1].t, [1, 3, 4]);

        mesh.prepare_triangles();
        assert!(mesh.faceted);
        mesh.use_kd_tree = false;
        mesh.begin_render();

        let ray = Ray::new(Vec3::new(0.5, 1.0, 0.5), Vec3::new(0.0, -1.0, 0.0));
        let mut info = IntersectionInfo::new();
        assert!(mesh.intersect(&ray, &mut info));
        assert_abs_diff_eq!(info.dist, 1.0, epsilon = 1e-12);
    }
}
