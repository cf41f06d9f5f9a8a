use rand::{
    prelude::Distribution,
    rngs::StdRng,
    Rng,
    SeedableRng,
};

use crate::{
    gaussian::{
        columns::ColumnTable,
        splat::Splat,
    },
    math::{
        self,
        quaternion,
    },
};


impl Distribution<Splat> for rand::distributions::Standard {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Splat {
        Splat {
            position: [
                rng.gen_range(-20.0..20.0),
                rng.gen_range(-20.0..20.0),
                rng.gen_range(-20.0..20.0),
            ],
            scale: [
                math::log_scale(rng.gen_range(0.001..1.0)),
                math::log_scale(rng.gen_range(0.001..1.0)),
                math::log_scale(rng.gen_range(0.001..1.0)),
            ],
            rotation: quaternion::normalize([
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
            ]),
            color: [
                rng.gen_range(-1.5..1.5),
                rng.gen_range(-1.5..1.5),
                rng.gen_range(-1.5..1.5),
            ],
            opacity: math::logit(rng.gen_range(0.05..0.95)),
        }
    }
}

pub fn random_splats(count: usize) -> ColumnTable {
    fill(&mut rand::thread_rng(), count)
}

pub fn random_splats_seeded(count: usize, seed: u64) -> ColumnTable {
    fill(&mut StdRng::seed_from_u64(seed), count)
}

fn fill<R: Rng>(rng: &mut R, count: usize) -> ColumnTable {
    let mut columns = ColumnTable::new(count);
    for index in 0..count {
        let splat: Splat = rng.r#gen();
        columns.set_splat(index, &splat);
    }
    columns
}
